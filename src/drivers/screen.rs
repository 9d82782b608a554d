//! SSD1306 OLED driver (optional peripheral).
//!
//! The screen is the one peripheral the transmitter can live without:
//! [`DisplayPort::probe`] may report nothing on the bus, in which case
//! boot records a degraded start and the UI runs headless — no splash,
//! no animations.
//!
//! Rendering is deliberately minimal (status bars, not text layout);
//! what matters to the supervisor is the lifecycle: probe → splash →
//! render loop → power-down.

#[cfg(not(target_os = "espidf"))]
use log::info;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Everything the UI renders from, copied out of `SystemStatus` once per
/// frame so the display never touches foreign state mid-render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusPage {
    pub link_up: bool,
    pub packet_rate_hz: u16,
    pub link_quality: u8,
    pub paired_peers: u8,
    pub pairing_active: bool,
    pub companion_active: bool,
    pub rf_power_dbm: u8,
}

/// Driven-side display boundary.
pub trait DisplayPort: Send {
    /// Probe the bus.  `Err` means no screen is fitted.
    fn probe(&mut self) -> Result<(), &'static str>;

    /// Boot splash, shown once when a screen is present.
    fn splash(&mut self);

    /// Draw one status frame.
    fn render(&mut self, page: &StatusPage);

    /// Contrast, 0–255.
    fn set_brightness(&mut self, level: u8);

    /// Blank and power the panel down.  Idempotent.
    fn power_down(&mut self);
}

// ---------------------------------------------------------------------------
// ESP-IDF I²C implementation
// ---------------------------------------------------------------------------

#[cfg(target_os = "espidf")]
pub mod esp {
    use super::{DisplayPort, StatusPage};
    use crate::pins;
    use esp_idf_hal::delay::BLOCK;
    use esp_idf_hal::i2c::I2cDriver;
    use log::info;

    const CMD_PREFIX: u8 = 0x00;
    const DATA_PREFIX: u8 = 0x40;

    /// SSD1306 over `I2cDriver`.
    pub struct EspScreen {
        i2c: I2cDriver<'static>,
        addr: u8,
        powered: bool,
    }

    impl EspScreen {
        pub fn new(i2c: I2cDriver<'static>) -> Self {
            Self {
                i2c,
                addr: pins::SCREEN_I2C_ADDR,
                powered: false,
            }
        }

        fn cmd(&mut self, bytes: &[u8]) -> Result<(), &'static str> {
            let mut buf = heapless::Vec::<u8, 8>::new();
            buf.push(CMD_PREFIX).ok();
            buf.extend_from_slice(bytes).map_err(|()| "cmd too long")?;
            self.i2c
                .write(self.addr, &buf, BLOCK)
                .map_err(|_| "i2c write failed")
        }

        fn data(&mut self, bytes: &[u8]) {
            let mut buf = [0u8; 33];
            buf[0] = DATA_PREFIX;
            for chunk in bytes.chunks(32) {
                buf[1..=chunk.len()].copy_from_slice(chunk);
                let _ = self.i2c.write(self.addr, &buf[..=chunk.len()], BLOCK);
            }
        }

        /// Horizontal bar of `filled` set pixels out of `width` columns.
        fn bar(&mut self, filled: usize, width: usize) {
            let mut row = [0u8; 64];
            for (i, col) in row.iter_mut().enumerate().take(width.min(64)) {
                *col = if i < filled { 0xFF } else { 0x18 };
            }
            self.data(&row[..width.min(64)]);
        }
    }

    impl DisplayPort for EspScreen {
        fn probe(&mut self) -> Result<(), &'static str> {
            // Display-off command doubles as an ACK probe.
            self.cmd(&[0xAE]).map_err(|_| "no screen on bus")?;
            // Charge pump + display on.
            self.cmd(&[0x8D, 0x14])?;
            self.cmd(&[0xAF])?;
            self.powered = true;
            info!("screen: SSD1306 at 0x{:02X}", self.addr);
            Ok(())
        }

        fn splash(&mut self) {
            // Full-frame flash, then clear.
            let _ = self.cmd(&[0xA5]);
            std::thread::sleep(std::time::Duration::from_millis(150));
            let _ = self.cmd(&[0xA4]);
        }

        fn render(&mut self, page: &StatusPage) {
            let lq = usize::from(page.link_quality) * 64 / 255;
            let rate = usize::from(page.packet_rate_hz).min(64);
            self.bar(lq, 64);
            self.bar(rate, 64);
        }

        fn set_brightness(&mut self, level: u8) {
            let _ = self.cmd(&[0x81, level]);
        }

        fn power_down(&mut self) {
            if self.powered {
                let _ = self.cmd(&[0xAE]);
                self.powered = false;
                info!("screen: powered down");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host simulation
// ---------------------------------------------------------------------------

/// In-memory screen for host runs.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimScreen {
    pub present: bool,
    pub powered: bool,
    pub splashes: u32,
    pub frames: u32,
    pub brightness: u8,
    pub last_page: StatusPage,
}

#[cfg(not(target_os = "espidf"))]
impl SimScreen {
    /// A screen that answers the probe.
    pub fn fitted() -> Self {
        Self {
            present: true,
            ..Default::default()
        }
    }

    /// An empty footprint — probe fails, boot degrades.
    pub fn absent() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl DisplayPort for SimScreen {
    fn probe(&mut self) -> Result<(), &'static str> {
        if self.present {
            self.powered = true;
            info!("screen(sim): probe ok");
            Ok(())
        } else {
            Err("no screen on bus")
        }
    }

    fn splash(&mut self) {
        self.splashes += 1;
    }

    fn render(&mut self, page: &StatusPage) {
        self.frames += 1;
        self.last_page = *page;
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level;
    }

    fn power_down(&mut self) {
        if self.powered {
            self.powered = false;
            info!("screen(sim): powered down");
        }
    }
}
