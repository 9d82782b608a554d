//! SkyLink firmware — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ bootstrap (single-threaded, strictly ordered)                │
//! │   config → settings → netif → address → link → peer → rc     │
//! │   → companion → ui                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ tasks (pinned, process lifetime)                             │
//! │   APP core: sky-rc (tight loop, watchdog, radio driver init) │
//! │   PRO core: sky-companion · sky-link · sky-ui (spawned last) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bootstrapper owns the only `&mut` phase; after `bring_up` leaks
//! the context, every task borrows it and the single-writer cells keep
//! the sharing sound without locks.

use anyhow::Result;
use log::{error, info, warn};

use skylink::boot::{self, BoardPorts};
use skylink::diagnostics;
use skylink::shutdown::{EspPlatform, PlatformPort};
use skylink::tasks;

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("SkyLink v{}", env!("CARGO_PKG_VERSION"));

    diagnostics::install_panic_handler();

    let board = board_ports()?;

    // Fatal init faults never reach a partial run: log and restart.
    let outcome = match boot::bring_up(board, Box::new(EspPlatform)) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("fatal boot fault: {e}");
            EspPlatform.restart();
        }
    };

    for d in &outcome.report.degraded {
        warn!("degraded start: {d}");
    }

    let task_set = tasks::start_tasks(outcome.ctx);
    info!(
        "SkyLink {} up, {} tasks running",
        outcome.report.device_id,
        task_set.spawn_order.len()
    );

    // Tasks run for the process lifetime; park here.
    task_set.join();
    Ok(())
}

/// Wire the real board peripherals.
#[cfg(target_os = "espidf")]
fn board_ports() -> Result<BoardPorts> {
    use esp_idf_hal::gpio::PinDriver;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriverConfig};
    use esp_idf_hal::units::FromValueType;

    use skylink::companion::BleTransport;
    use skylink::drivers::radio::SpiRadioBus;
    use skylink::drivers::screen::esp::EspScreen;
    use skylink::rc::AdcSticks;

    let p = Peripherals::take()?;

    // Radio on SPI2.
    let spi = SpiDeviceDriver::new_single(
        p.spi2,
        p.pins.gpio12, // SCK
        p.pins.gpio11, // MOSI
        Some(p.pins.gpio13), // MISO
        Some(p.pins.gpio10), // CS
        &SpiDriverConfig::new(),
        &SpiConfig::new().baudrate(8.MHz().into()),
    )?;
    let radio_rst = PinDriver::output(p.pins.gpio9)?;

    // Optional OLED on I2C0; the probe decides fitted vs. degraded.
    let i2c = I2cDriver::new(
        p.i2c0,
        p.pins.gpio5,
        p.pins.gpio6,
        &I2cConfig::new().baudrate(100.kHz().into()),
    )?;

    // The companion GATT service pushes characteristic writes into this
    // sender; the transport's blocking receive paces the companion task.
    let (companion, gatt_tx) = BleTransport::new();
    Box::leak(Box::new(gatt_tx));

    Ok(BoardPorts {
        radio_bus: Box::new(SpiRadioBus::new(spi, radio_rst)),
        display: Box::new(EspScreen::new(i2c)),
        companion: Box::new(companion),
        sampler: Box::new(AdcSticks::board_default()),
    })
}

/// Host run: all-simulation board.
#[cfg(not(target_os = "espidf"))]
fn board_ports() -> Result<BoardPorts> {
    Ok(BoardPorts::sim())
}
