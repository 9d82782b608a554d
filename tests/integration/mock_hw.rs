//! Recording mock board for integration tests.
//!
//! Every hardware side effect lands in one shared, ordered event log so
//! tests can assert on sequencing (e.g. the fixed shutdown order)
//! without touching real buses.  Test doubles may lock; the supervisory
//! core under test never does.

use std::sync::{Arc, Mutex};

use skylink::boot::BoardPorts;
use skylink::companion::CompanionTransport;
use skylink::drivers::radio::{RadioBus, RadioError};
use skylink::drivers::screen::{DisplayPort, StatusPage};
use skylink::rc::{InputSampler, CHANNEL_COUNT, CHANNEL_MAX};
use skylink::shutdown::PlatformPort;

/// Shared ordered event log.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_entries(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn push(log: &EventLog, entry: &str) {
    log.lock().unwrap().push(entry.to_string());
}

// ── Radio bus ─────────────────────────────────────────────────

const REG_OP_MODE: u8 = 0x01;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_VERSION: u8 = 0x42;
const CHIP_VERSION: u8 = 0x12;
const OPMODE_SLEEP_LORA: u8 = 0x80;
const OPMODE_TX: u8 = 0x03;
const IRQ_TX_DONE: u8 = 0x08;

/// Register-level radio model that records probe and power-down events.
pub struct RecordingRadioBus {
    log: EventLog,
    regs: [u8; 128],
    probed: bool,
}

impl RecordingRadioBus {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            regs: [0; 128],
            probed: false,
        }
    }
}

impl RadioBus for RecordingRadioBus {
    fn reset_and_probe(&mut self) -> Result<u8, RadioError> {
        self.probed = true;
        self.regs = [0; 128];
        self.regs[REG_VERSION as usize] = CHIP_VERSION;
        push(&self.log, "radio-probe");
        Ok(CHIP_VERSION)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        if reg == REG_IRQ_FLAGS {
            self.regs[REG_IRQ_FLAGS as usize] &= !value;
            return Ok(());
        }
        // Power-down is the standby/TX → sleep transition; the driver's
        // own init also passes through sleep mode, which must not count.
        if reg == REG_OP_MODE
            && value == OPMODE_SLEEP_LORA
            && self.probed
            && self.regs[REG_OP_MODE as usize] & 0x07 != 0
        {
            push(&self.log, "radio-off");
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

    fn write_fifo(&mut self, _data: &[u8]) -> Result<(), RadioError> {
        Ok(())
    }
}

// ── Display ───────────────────────────────────────────────────

pub struct RecordingDisplay {
    log: EventLog,
    present: bool,
    powered: bool,
}

impl RecordingDisplay {
    pub fn fitted(log: EventLog) -> Self {
        Self {
            log,
            present: true,
            powered: false,
        }
    }

    pub fn absent(log: EventLog) -> Self {
        Self {
            log,
            present: false,
            powered: false,
        }
    }
}

impl DisplayPort for RecordingDisplay {
    fn probe(&mut self) -> Result<(), &'static str> {
        if self.present {
            self.powered = true;
            Ok(())
        } else {
            Err("no screen on bus")
        }
    }

    fn splash(&mut self) {
        push(&self.log, "ui-splash");
    }

    fn render(&mut self, _page: &StatusPage) {
        push(&self.log, "ui-render");
    }

    fn set_brightness(&mut self, _level: u8) {}

    fn power_down(&mut self) {
        if self.powered {
            self.powered = false;
            push(&self.log, "ui-off");
        }
    }
}

// ── Platform ──────────────────────────────────────────────────

pub struct RecordingPlatform {
    log: EventLog,
}

impl RecordingPlatform {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl PlatformPort for RecordingPlatform {
    fn power_off(&self) {
        push(&self.log, "platform-off");
    }

    fn restart(&self) -> ! {
        unreachable!("restart is not exercised by these tests");
    }
}

// ── Companion transport ───────────────────────────────────────

/// Delivers scripted frames, then times out instantly.
pub struct ScriptedTransport {
    frames: Vec<Vec<u8>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn silent() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn with_frames(mut frames: Vec<Vec<u8>>) -> Self {
        frames.reverse();
        Self { frames }
    }
}

impl CompanionTransport for ScriptedTransport {
    fn recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        let frame = self.frames.pop()?;
        buf[..frame.len()].copy_from_slice(&frame);
        Some(frame.len())
    }
}

// ── Sticks ────────────────────────────────────────────────────

pub struct CenterSticks;

impl InputSampler for CenterSticks {
    fn sample(&mut self) -> [u16; CHANNEL_COUNT] {
        [CHANNEL_MAX / 2; CHANNEL_COUNT]
    }
}

// ── Board assembly ────────────────────────────────────────────

/// Recording board with a fitted display.
pub fn board(log: &EventLog) -> BoardPorts {
    BoardPorts {
        radio_bus: Box::new(RecordingRadioBus::new(Arc::clone(log))),
        display: Box::new(RecordingDisplay::fitted(Arc::clone(log))),
        companion: Box::new(ScriptedTransport::silent()),
        sampler: Box::new(CenterSticks),
    }
}

/// Recording board with the optional display missing.
pub fn board_without_display(log: &EventLog) -> BoardPorts {
    BoardPorts {
        radio_bus: Box::new(RecordingRadioBus::new(Arc::clone(log))),
        display: Box::new(RecordingDisplay::absent(Arc::clone(log))),
        companion: Box::new(ScriptedTransport::silent()),
        sampler: Box::new(CenterSticks),
    }
}

pub fn platform(log: &EventLog) -> Box<RecordingPlatform> {
    Box::new(RecordingPlatform::new(Arc::clone(log)))
}
