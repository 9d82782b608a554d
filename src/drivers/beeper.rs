//! Piezo beeper driver (LEDC tone channel).
//!
//! The UI plays short patterns (boot chirp, pairing tick, shutdown);
//! the driver only knows "tone on at f Hz" / "off".  On the host the
//! state is tracked in memory.

use crate::pins;

pub struct Beeper {
    gpio: i32,
    enabled: bool,
    active: bool,
}

impl Beeper {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            enabled: true,
            active: false,
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Mute/unmute (the beeper-enabled setting).  Muting stops any
    /// current tone.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.off();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start a tone.  No-op while muted.
    pub fn tone_on(&mut self, freq_hz: u32) {
        if !self.enabled {
            return;
        }
        self.active = true;

        #[cfg(target_os = "espidf")]
        // SAFETY: LEDC channel 0 is dedicated to the beeper; only the UI
        // task drives it.
        unsafe {
            use esp_idf_svc::sys::*;
            ledc_set_freq(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_timer_t_LEDC_TIMER_0,
                freq_hz,
            );
            ledc_set_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
                1 << (pins::BEEPER_PWM_RESOLUTION_BITS - 1),
            );
            ledc_update_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
            );
        }

        #[cfg(not(target_os = "espidf"))]
        let _ = freq_hz;
    }

    /// Stop the tone.  Idempotent.
    pub fn off(&mut self) {
        self.active = false;

        #[cfg(target_os = "espidf")]
        // SAFETY: same channel ownership as `tone_on`.
        unsafe {
            use esp_idf_svc::sys::*;
            ledc_set_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
                0,
            );
            ledc_update_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
            );
        }
    }
}
