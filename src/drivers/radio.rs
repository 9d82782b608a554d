//! SX1276-class LoRa radio driver.
//!
//! The [`Radio`] handle is constructed during bootstrap (pins + bus), but
//! [`driver_init`](Radio::driver_init) is deliberately **not** called
//! there: it runs inside the control-input task after that task is pinned
//! to its core, so the DIO0 interrupt is serviced on the same core that
//! initialized the driver.  Cross-core interrupt delivery adds latency
//! the control loop cannot afford.
//!
//! Register access goes through the [`RadioBus`] trait: an
//! `embedded-hal`-generic SPI implementation for real hardware, an
//! in-memory register file on the host.

use log::info;

use crate::context::TaskId;
pub use crate::error::RadioError;

/// Largest frame the TX FIFO accepts in one burst.
pub const MAX_AIR_FRAME: usize = 64;

/// SX127x version register value for production silicon.
const CHIP_VERSION: u8 = 0x12;

// Register map (the subset this driver touches).
const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_PA_CONFIG: u8 = 0x09;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_VERSION: u8 = 0x42;

const OPMODE_LORA: u8 = 0x80;
const OPMODE_SLEEP: u8 = 0x00;
const OPMODE_STANDBY: u8 = 0x01;
const OPMODE_TX: u8 = 0x03;

const IRQ_TX_DONE: u8 = 0x08;
const IRQ_RX_DONE: u8 = 0x40;

// ---------------------------------------------------------------------------
// Pins & events
// ---------------------------------------------------------------------------

/// SPI + control pin block for the radio module.
#[derive(Debug, Clone, Copy)]
pub struct RadioPins {
    pub mosi: i32,
    pub miso: i32,
    pub sck: i32,
    pub cs: i32,
    pub rst: i32,
    pub dio0: i32,
}

impl RadioPins {
    /// Board wiring from [`crate::pins`].
    pub fn board_default() -> Self {
        use crate::pins;
        Self {
            mosi: pins::RADIO_MOSI_GPIO,
            miso: pins::RADIO_MISO_GPIO,
            sck: pins::RADIO_SCK_GPIO,
            cs: pins::RADIO_CS_GPIO,
            rst: pins::RADIO_RST_GPIO,
            dio0: pins::RADIO_DIO0_GPIO,
        }
    }
}

/// Completed radio operations, drained by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    TxDone,
    RxDone,
}

// ---------------------------------------------------------------------------
// Bus trait
// ---------------------------------------------------------------------------

/// Raw register access to the radio chip.
pub trait RadioBus: Send {
    /// Pulse hardware reset and return the chip version register.
    fn reset_and_probe(&mut self) -> Result<u8, RadioError>;

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError>;

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError>;

    /// Burst-write a frame into the TX FIFO.
    fn write_fifo(&mut self, data: &[u8]) -> Result<(), RadioError>;
}

// ---------------------------------------------------------------------------
// Radio handle
// ---------------------------------------------------------------------------

pub struct Radio {
    pins: RadioPins,
    bus: Box<dyn RadioBus>,
    driver_ready: bool,
    tx_power_dbm: u8,
    frames_sent: u32,
}

impl Radio {
    /// Construct the handle.  No bus traffic happens here; the chip stays
    /// in reset until [`driver_init`](Self::driver_init).
    pub fn new(pins: RadioPins, bus: Box<dyn RadioBus>) -> Self {
        Self {
            pins,
            bus,
            driver_ready: false,
            tx_power_dbm: 14,
            frames_sent: 0,
        }
    }

    pub fn is_driver_ready(&self) -> bool {
        self.driver_ready
    }

    pub fn pins(&self) -> RadioPins {
        self.pins
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Bring the chip out of reset and configure LoRa mode.
    ///
    /// Must run inside the control-input task (the task that services
    /// DIO0), never during generic bootstrap.
    pub fn driver_init(&mut self) -> Result<(), RadioError> {
        debug_assert_eq!(
            TaskId::current(),
            Some(TaskId::ControlInput),
            "radio driver_init outside the control-input task"
        );

        let version = self.bus.reset_and_probe()?;
        if version != CHIP_VERSION {
            return Err(RadioError::UnknownChip);
        }

        self.bus.write_reg(REG_OP_MODE, OPMODE_LORA | OPMODE_SLEEP)?;
        self.bus
            .write_reg(REG_OP_MODE, OPMODE_LORA | OPMODE_STANDBY)?;
        self.apply_pa_config()?;

        self.driver_ready = true;
        info!(
            "radio: driver ready (dio0=GPIO{}, {} dBm)",
            self.pins.dio0, self.tx_power_dbm
        );
        Ok(())
    }

    /// Set TX power in dBm (clamped to the PA_BOOST range 2–17).
    /// Takes effect immediately when the driver is up, otherwise at
    /// `driver_init`.
    pub fn set_tx_power(&mut self, dbm: u8) -> Result<(), RadioError> {
        self.tx_power_dbm = dbm.clamp(2, 17);
        if self.driver_ready {
            self.apply_pa_config()?;
        }
        Ok(())
    }

    pub fn tx_power_dbm(&self) -> u8 {
        self.tx_power_dbm
    }

    /// Load `frame` into the FIFO and switch to TX.
    pub fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        if !self.driver_ready {
            return Err(RadioError::DriverNotReady);
        }
        if frame.len() > MAX_AIR_FRAME {
            return Err(RadioError::FrameTooLong);
        }

        self.bus.write_fifo(frame)?;
        self.bus.write_reg(REG_OP_MODE, OPMODE_LORA | OPMODE_TX)?;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        Ok(())
    }

    /// Drain one completed operation, if any.
    pub fn poll(&mut self) -> Option<RadioEvent> {
        if !self.driver_ready {
            return None;
        }
        let flags = self.bus.read_reg(REG_IRQ_FLAGS).ok()?;
        if flags & IRQ_TX_DONE != 0 {
            let _ = self.bus.write_reg(REG_IRQ_FLAGS, IRQ_TX_DONE);
            return Some(RadioEvent::TxDone);
        }
        if flags & IRQ_RX_DONE != 0 {
            let _ = self.bus.write_reg(REG_IRQ_FLAGS, IRQ_RX_DONE);
            return Some(RadioEvent::RxDone);
        }
        None
    }

    /// Put the chip to sleep.  Idempotent; used by the shutdown path.
    pub fn power_down(&mut self) {
        if self.driver_ready {
            let _ = self.bus.write_reg(REG_OP_MODE, OPMODE_LORA | OPMODE_SLEEP);
            self.driver_ready = false;
            info!("radio: powered down");
        }
    }

    fn apply_pa_config(&mut self) -> Result<(), RadioError> {
        // PA_BOOST pin, OutputPower = dBm - 2.
        let pa = 0x80 | (self.tx_power_dbm - 2);
        self.bus.write_reg(REG_PA_CONFIG, pa)
    }
}

// ---------------------------------------------------------------------------
// embedded-hal SPI bus
// ---------------------------------------------------------------------------

/// Bus implementation over any `embedded-hal` 1.0 SPI device + reset pin.
pub struct SpiRadioBus<SPI, RST> {
    spi: SPI,
    rst: RST,
}

impl<SPI, RST> SpiRadioBus<SPI, RST>
where
    SPI: embedded_hal::spi::SpiDevice<u8> + Send,
    RST: embedded_hal::digital::OutputPin + Send,
{
    pub fn new(spi: SPI, rst: RST) -> Self {
        Self { spi, rst }
    }
}

impl<SPI, RST> RadioBus for SpiRadioBus<SPI, RST>
where
    SPI: embedded_hal::spi::SpiDevice<u8> + Send,
    RST: embedded_hal::digital::OutputPin + Send,
{
    fn reset_and_probe(&mut self) -> Result<u8, RadioError> {
        self.rst.set_low().map_err(|_| RadioError::BusFault)?;
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.rst.set_high().map_err(|_| RadioError::BusFault)?;
        std::thread::sleep(std::time::Duration::from_millis(5));
        self.read_reg(REG_VERSION)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        // MSB set = write.
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|_| RadioError::BusFault)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        let mut buf = [reg & 0x7F, 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| RadioError::BusFault)?;
        Ok(buf[1])
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), RadioError> {
        let mut frame = heapless::Vec::<u8, { MAX_AIR_FRAME + 1 }>::new();
        frame.push(REG_FIFO | 0x80).ok();
        frame
            .extend_from_slice(data)
            .map_err(|()| RadioError::FrameTooLong)?;
        self.spi.write(&frame).map_err(|_| RadioError::BusFault)
    }
}

// ---------------------------------------------------------------------------
// Host register file
// ---------------------------------------------------------------------------

/// In-memory chip model for host runs: probe answers with the production
/// version, TX completes instantly (TX_DONE latched for the next poll).
#[cfg(not(target_os = "espidf"))]
pub struct SimRadioBus {
    regs: [u8; 128],
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimRadioBus {
    fn default() -> Self {
        Self { regs: [0; 128] }
    }
}

#[cfg(not(target_os = "espidf"))]
impl SimRadioBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl RadioBus for SimRadioBus {
    fn reset_and_probe(&mut self) -> Result<u8, RadioError> {
        self.regs = [0; 128];
        self.regs[REG_VERSION as usize] = CHIP_VERSION;
        Ok(CHIP_VERSION)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        if reg == REG_IRQ_FLAGS {
            // Writing a flag clears it.
            self.regs[REG_IRQ_FLAGS as usize] &= !value;
            return Ok(());
        }
        self.regs[reg as usize] = value;
        if reg == REG_OP_MODE && value & 0x07 == OPMODE_TX {
            self.regs[REG_IRQ_FLAGS as usize] |= IRQ_TX_DONE;
        }
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        Ok(self.regs[reg as usize])
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if data.len() > MAX_AIR_FRAME {
            return Err(RadioError::FrameTooLong);
        }
        Ok(())
    }
}
