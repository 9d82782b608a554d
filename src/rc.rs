//! Control-input subsystem.
//!
//! Owns the hot path of the transmitter: sample the gimbals, fold in a
//! fresh companion frame when one arrived, drive one radio airtime slot,
//! publish the rates the UI renders.  Runs on the control-input task with
//! no sleep — the watchdog lease is renewed around every call to
//! [`ControlInput::update`].
//!
//! The link task never touches the radio; its frames arrive through the
//! [`FrameRing`] and are interleaved into airtime here.

use log::info;

use crate::context::{InputMailbox, SystemStatus};
use crate::drivers::radio::Radio;
use crate::error::InitError;
use crate::link::{FrameRing, MAX_ENCODED_FRAME};

/// Stick channel count (roll, pitch, throttle, yaw).
pub const CHANNEL_COUNT: usize = 4;

/// Full-scale stick value (11-bit ADC range).
pub const CHANNEL_MAX: u16 = 2047;

/// Every Nth airtime slot is offered to the link-frame ring.
const LINK_AIRTIME_STRIDE: u32 = 8;

/// Packet-rate accounting window.
const RATE_WINDOW_MS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Sampler port
// ---------------------------------------------------------------------------

/// Reads the physical stick channels.
pub trait InputSampler: Send {
    /// Current channel values, 0–[`CHANNEL_MAX`].
    fn sample(&mut self) -> [u16; CHANNEL_COUNT];
}

/// Host sampler: centered sticks.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimSticks;

#[cfg(not(target_os = "espidf"))]
impl InputSampler for SimSticks {
    fn sample(&mut self) -> [u16; CHANNEL_COUNT] {
        [CHANNEL_MAX / 2; CHANNEL_COUNT]
    }
}

/// ADC gimbal sampler.
#[cfg(target_os = "espidf")]
pub struct AdcSticks {
    channels: [i32; CHANNEL_COUNT],
}

#[cfg(target_os = "espidf")]
impl AdcSticks {
    pub fn board_default() -> Self {
        Self {
            channels: crate::pins::STICK_ADC_GPIOS,
        }
    }
}

#[cfg(target_os = "espidf")]
impl InputSampler for AdcSticks {
    fn sample(&mut self) -> [u16; CHANNEL_COUNT] {
        let mut out = [0u16; CHANNEL_COUNT];
        for (slot, gpio) in out.iter_mut().zip(self.channels) {
            // ADC1 channel n sits on GPIO n+1 on the S3.
            // SAFETY: oneshot ADC read on a channel configured at boot.
            let raw = unsafe { esp_idf_svc::sys::adc1_get_raw((gpio - 1) as _) };
            *slot = raw.clamp(0, i32::from(CHANNEL_MAX)) as u16;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Subsystem
// ---------------------------------------------------------------------------

pub struct ControlInput {
    sampler: Box<dyn InputSampler>,
    channels: [u16; CHANNEL_COUNT],
    frame_seq: u16,
    companion_seq: u32,
    companion_fresh: bool,
    iterations: u32,
    window_start_ms: u32,
    frames_in_window: u16,
}

impl ControlInput {
    pub fn new(sampler: Box<dyn InputSampler>) -> Self {
        Self {
            sampler,
            channels: [CHANNEL_MAX / 2; CHANNEL_COUNT],
            frame_seq: 0,
            companion_seq: 0,
            companion_fresh: false,
            iterations: 0,
            window_start_ms: 0,
            frames_in_window: 0,
        }
    }

    /// Bind to the radio handle and the link protocol.
    ///
    /// The radio must still be driver-uninitialized here: its driver runs
    /// inside this subsystem's own task, not during bootstrap.
    pub fn init(&mut self, radio: &Radio) -> Result<(), InitError> {
        debug_assert!(
            !radio.is_driver_ready(),
            "radio driver must not be initialized during bootstrap"
        );
        info!(
            "rc: bound to radio (driver deferred, dio0=GPIO{})",
            radio.pins().dio0
        );
        Ok(())
    }

    pub fn channels(&self) -> [u16; CHANNEL_COUNT] {
        self.channels
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// One control-loop iteration.
    pub fn update(
        &mut self,
        now_ms: u32,
        radio: &mut Radio,
        companion: &InputMailbox,
        link_tx: &FrameRing,
        status: &SystemStatus,
    ) {
        self.iterations = self.iterations.wrapping_add(1);

        // Physical sticks, unless the companion pushed a fresher frame.
        self.channels = self.sampler.sample();
        if let Some(frame) = companion.take_fresh(&mut self.companion_seq) {
            self.channels = frame.channels;
            self.companion_fresh = true;
        } else {
            self.companion_fresh = false;
        }

        // Apply a pending TX-power change (written by the settings
        // listener on some other task, read here, applied to the radio
        // by its one designated mutator).
        let want_dbm = status.rf_power_dbm();
        if want_dbm != 0 && want_dbm != radio.tx_power_dbm() {
            let _ = radio.set_tx_power(want_dbm);
        }

        // One airtime slot: mostly control frames, every Nth slot offered
        // to the link protocol's outbound ring.
        let sent = if self.iterations % LINK_AIRTIME_STRIDE == 0 && !link_tx.is_empty() {
            self.transmit_link_frame(radio, link_tx)
        } else {
            self.transmit_control_frame(radio)
        };

        if sent {
            status.bump_rc_frames();
            self.frames_in_window = self.frames_in_window.saturating_add(1);
        }

        let _ = radio.poll();

        // Rate window rollover.
        if now_ms.wrapping_sub(self.window_start_ms) >= RATE_WINDOW_MS {
            status.set_packet_rate_hz(self.frames_in_window);
            status.set_link_quality(if self.frames_in_window > 0 { 255 } else { 0 });
            self.window_start_ms = now_ms;
            self.frames_in_window = 0;
        }
    }

    fn transmit_control_frame(&mut self, radio: &mut Radio) -> bool {
        let mut buf = [0u8; 12];
        buf[0] = b'C';
        buf[1] = self.frame_seq as u8;
        buf[2] = (self.frame_seq >> 8) as u8;
        for (i, ch) in self.channels.iter().enumerate() {
            buf[3 + i * 2] = *ch as u8;
            buf[4 + i * 2] = (*ch >> 8) as u8;
        }
        buf[11] = buf[..11].iter().fold(0u8, |acc, b| acc ^ b);

        if radio.transmit(&buf).is_ok() {
            self.frame_seq = self.frame_seq.wrapping_add(1);
            true
        } else {
            false
        }
    }

    fn transmit_link_frame(&mut self, radio: &mut Radio, link_tx: &FrameRing) -> bool {
        let Some(frame) = link_tx.pop() else {
            return false;
        };
        let mut buf = [0u8; MAX_ENCODED_FRAME];
        let len = frame.encode(&mut buf);
        radio.transmit(&buf[..len]).is_ok()
    }
}
