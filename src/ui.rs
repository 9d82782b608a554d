//! UI subsystem: optional OLED, beeper, and the power button.
//!
//! Initialized last during bootstrap because rendering reads every other
//! subsystem's published state; the UI task is likewise created last, so
//! its first `update` can assert the rest of the system is ready.
//!
//! The display is optional: a failed probe degrades the UI to headless
//! operation (no splash, no animation) without failing boot.

use log::{info, warn};

use crate::context::SystemStatus;
use crate::drivers::beeper::Beeper;
use crate::drivers::button::{ButtonDriver, ButtonEvent};
use crate::drivers::screen::{DisplayPort, StatusPage};
use crate::error::DegradedStart;
use crate::pins;
use crate::settings::{SettingKey, SettingValue, SettingsRegistry};

/// Splash animation length.
const SPLASH_MS: u32 = 600;

/// Status page refresh cadence while idle.
const RENDER_INTERVAL_MS: u32 = 250;

/// Short confirmation beep length.
const BEEP_MS: u32 = 40;

/// Status pages the short press cycles through.
const PAGE_COUNT: u8 = 3;

pub struct UiSystem {
    display: Option<Box<dyn DisplayPort>>,
    beeper: Beeper,
    button: ButtonDriver,
    page: u8,
    brightness: u8,
    anim_start_ms: u32,
    anim_len_ms: u32,
    beep_until_ms: u32,
    last_render_ms: u32,
    first_update_done: bool,
    powered_down: bool,
}

impl UiSystem {
    /// Probe the display and assemble the subsystem.
    ///
    /// Returns the UI plus `Some(DegradedStart)` when the optional screen
    /// is absent; only button/beeper problems are fatal, and those are
    /// constructed infallibly from the pin map.
    pub fn init(
        mut display: Box<dyn DisplayPort>,
        brightness: u8,
    ) -> (Self, Option<DegradedStart>) {
        let (display, degraded) = match display.probe() {
            Ok(()) => {
                display.set_brightness(brightness);
                (Some(display), None)
            }
            Err(reason) => {
                warn!("ui: {reason} — continuing headless");
                (None, Some(DegradedStart::DisplayAbsent))
            }
        };

        let ui = Self {
            display,
            beeper: Beeper::new(pins::BEEPER_GPIO),
            button: ButtonDriver::new(pins::BUTTON_GPIO),
            page: 0,
            brightness,
            anim_start_ms: 0,
            anim_len_ms: 0,
            beep_until_ms: 0,
            last_render_ms: 0,
            first_update_done: false,
            powered_down: false,
        };
        info!(
            "ui: initialized ({})",
            if ui.display.is_some() {
                "screen fitted"
            } else {
                "headless"
            }
        );
        (ui, degraded)
    }

    pub fn screen_available(&self) -> bool {
        self.display.is_some()
    }

    pub fn page(&self) -> u8 {
        self.page
    }

    /// Boot splash.  Called once by the UI task before its loop; a no-op
    /// without a screen, so a degraded start shows nothing.
    pub fn splash(&mut self, now_ms: u32) {
        if let Some(display) = self.display.as_mut() {
            display.splash();
            self.anim_start_ms = now_ms;
            self.anim_len_ms = SPLASH_MS;
        }
    }

    /// Whether a splash/transition animation is running — the UI task
    /// spins without sleeping while this holds.
    pub fn is_animating(&self, now_ms: u32) -> bool {
        self.anim_len_ms != 0 && now_ms.wrapping_sub(self.anim_start_ms) < self.anim_len_ms
    }

    /// One UI iteration with an explicit button level (host tests drive
    /// this directly).
    pub fn update_with_input(
        &mut self,
        now_ms: u32,
        pressed: bool,
        settings: &SettingsRegistry,
        status: &SystemStatus,
    ) {
        if !self.first_update_done {
            debug_assert!(
                status.core_ready(),
                "UI updated before the other subsystems initialized"
            );
            self.first_update_done = true;
        }

        // Settings that belong to the UI.
        self.beeper.set_enabled(settings.beeper_enabled());
        let brightness = settings.screen_brightness();
        if brightness != self.brightness {
            self.brightness = brightness;
            if let Some(display) = self.display.as_mut() {
                display.set_brightness(brightness);
            }
        }

        // Button gestures.
        match self.button.tick(pressed, now_ms) {
            Some(ButtonEvent::ShortPress) => {
                self.page = (self.page + 1) % PAGE_COUNT;
                self.chirp(now_ms);
            }
            Some(ButtonEvent::LongPress) => {
                info!("ui: long press — requesting power off");
                self.chirp(now_ms);
                // Fires the shutdown listener synchronously on this task.
                settings.set(SettingKey::PowerOff, SettingValue::Bool(true));
            }
            None => {}
        }

        if self.beep_until_ms != 0 && now_ms.wrapping_sub(self.beep_until_ms) < u32::MAX / 2 {
            self.beeper.off();
            self.beep_until_ms = 0;
        }

        // Render: every iteration while animating, throttled while idle.
        let due = self.is_animating(now_ms)
            || now_ms.wrapping_sub(self.last_render_ms) >= RENDER_INTERVAL_MS;
        if due {
            self.last_render_ms = now_ms;
            let page = StatusPage {
                link_up: status.link_up(),
                packet_rate_hz: status.packet_rate_hz(),
                link_quality: status.link_quality(),
                paired_peers: status.paired_peers(),
                pairing_active: status.pairing_active(),
                companion_active: status.companion_active(),
                rf_power_dbm: status.rf_power_dbm(),
            };
            if let Some(display) = self.display.as_mut() {
                display.render(&page);
            }
        }
    }

    /// One UI iteration reading the hardware button level.
    #[cfg(target_os = "espidf")]
    pub fn update(&mut self, now_ms: u32, settings: &SettingsRegistry, status: &SystemStatus) {
        let pressed = self.button.read_level();
        self.update_with_input(now_ms, pressed, settings, status);
    }

    /// Host variant: no hardware button to read.
    #[cfg(not(target_os = "espidf"))]
    pub fn update(&mut self, now_ms: u32, settings: &SettingsRegistry, status: &SystemStatus) {
        self.update_with_input(now_ms, false, settings, status);
    }

    /// Power the UI hardware down.  Idempotent; shutdown path only.
    pub fn power_down(&mut self) {
        if self.powered_down {
            return;
        }
        self.powered_down = true;
        self.beeper.off();
        if let Some(display) = self.display.as_mut() {
            display.power_down();
        }
        info!("ui: powered down");
    }

    fn chirp(&mut self, now_ms: u32) {
        self.beeper.tone_on(pins::BEEPER_TONE_HZ);
        self.beep_until_ms = now_ms.wrapping_add(BEEP_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsSnapshot;
    use crate::context::Subsystem;
    use crate::drivers::screen::SimScreen;

    fn ready_status() -> SystemStatus {
        let status = SystemStatus::new();
        status.mark_ready(Subsystem::Link);
        status.mark_ready(Subsystem::Peer);
        status.mark_ready(Subsystem::ControlInput);
        status.mark_ready(Subsystem::Companion);
        status
    }

    fn registry() -> SettingsRegistry {
        SettingsRegistry::from_snapshot(&SettingsSnapshot::default())
    }

    #[test]
    fn fitted_screen_gets_splash_and_animation() {
        let (mut ui, degraded) = UiSystem::init(Box::new(SimScreen::fitted()), 128);
        assert!(degraded.is_none());
        assert!(ui.screen_available());

        ui.splash(0);
        assert!(ui.is_animating(0));
        assert!(ui.is_animating(SPLASH_MS - 1));
        assert!(!ui.is_animating(SPLASH_MS));
    }

    #[test]
    fn absent_screen_degrades_without_splash() {
        let (mut ui, degraded) = UiSystem::init(Box::new(SimScreen::absent()), 128);
        assert_eq!(degraded, Some(DegradedStart::DisplayAbsent));
        assert!(!ui.screen_available());

        ui.splash(0);
        assert!(!ui.is_animating(0), "no animation without a screen");
    }

    #[test]
    fn short_press_cycles_pages() {
        let (mut ui, _) = UiSystem::init(Box::new(SimScreen::fitted()), 128);
        let settings = registry();
        let status = ready_status();

        // Press through debounce, then release.
        ui.update_with_input(0, true, &settings, &status);
        ui.update_with_input(40, true, &settings, &status);
        ui.update_with_input(80, false, &settings, &status);
        assert_eq!(ui.page(), 1);
    }

    #[test]
    fn long_press_requests_power_off() {
        let (mut ui, _) = UiSystem::init(Box::new(SimScreen::fitted()), 128);
        let settings = registry();
        let status = ready_status();

        ui.update_with_input(0, true, &settings, &status);
        ui.update_with_input(40, true, &settings, &status);
        ui.update_with_input(1_600, true, &settings, &status);
        assert!(settings.value_of(SettingKey::PowerOff).as_bool());
    }

    #[test]
    fn power_down_is_idempotent() {
        let (mut ui, _) = UiSystem::init(Box::new(SimScreen::fitted()), 128);
        ui.power_down();
        ui.power_down();
        assert!(ui.screen_available(), "handle retained, hardware off");
    }

    #[test]
    #[should_panic(expected = "UI updated before the other subsystems")]
    fn first_update_asserts_system_ready() {
        let (mut ui, _) = UiSystem::init(Box::new(SimScreen::fitted()), 128);
        let settings = registry();
        let status = SystemStatus::new();
        ui.update_with_input(0, false, &settings, &status);
    }
}
