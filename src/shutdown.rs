//! Coordinated, idempotent shutdown.
//!
//! Power-off can be requested from any task — the UI long-press handler,
//! a companion command, or any other writer of the power-off setting.
//! All requests funnel through [`ShutdownCoordinator::fire`], which flips
//! the `Armed → Fired` latch exactly once; the winner tears down the
//! subsystems with physical side effects in strict reverse-of-acquisition
//! order and then powers the platform off.  Later calls are no-ops.
//!
//! Shutdown is fire-and-forget: no task is asked to quiesce, because the
//! platform power-off halts the whole process.

use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use log::{info, warn};

use crate::context::AppContext;
use crate::settings::{SettingChange, SettingKey, SettingListener};

// ---------------------------------------------------------------------------
// Platform port
// ---------------------------------------------------------------------------

/// Platform-level power control, the last stop of the teardown order.
pub trait PlatformPort: Send + Sync {
    /// Cut power (deep sleep with no wake source on the ESP32-S3).
    fn power_off(&self);

    /// Restart the chip.  Used for fatal boot faults only.
    fn restart(&self) -> !;
}

/// Production platform backend.
pub struct EspPlatform;

impl PlatformPort for EspPlatform {
    fn power_off(&self) {
        info!("platform: power off");
        #[cfg(target_os = "espidf")]
        // SAFETY: final call of the shutdown sequence; never returns
        // control to any task.
        unsafe {
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
    }

    fn restart(&self) -> ! {
        #[cfg(target_os = "espidf")]
        // SAFETY: esp_restart never returns.
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }

        #[cfg(not(target_os = "espidf"))]
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Latch
// ---------------------------------------------------------------------------

/// Shutdown latch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Armed = 0,
    Fired = 1,
}

pub struct ShutdownCoordinator {
    state: AtomicU8,
    /// Set once by [`arm`](Self::arm) after the bootstrapper leaks the
    /// context; null until then.
    ctx: AtomicPtr<AppContext>,
    platform: Box<dyn PlatformPort>,
}

impl ShutdownCoordinator {
    pub fn new(platform: Box<dyn PlatformPort>) -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Armed as u8),
            ctx: AtomicPtr::new(core::ptr::null_mut()),
            platform,
        }
    }

    /// Hand the coordinator the context it will tear down.  Called once
    /// at the end of bootstrap.
    pub fn arm(&self, ctx: &'static AppContext) {
        self.ctx
            .store(ctx as *const AppContext as *mut AppContext, Ordering::Release);
    }

    pub fn state(&self) -> ShutdownState {
        if self.state.load(Ordering::Acquire) == ShutdownState::Fired as u8 {
            ShutdownState::Fired
        } else {
            ShutdownState::Armed
        }
    }

    /// Trigger shutdown.  The first caller performs the teardown and
    /// returns `true`; every later caller is a no-op returning `false`.
    pub fn fire(&self) -> bool {
        if self
            .state
            .compare_exchange(
                ShutdownState::Armed as u8,
                ShutdownState::Fired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        info!("shutdown: latch fired");

        let ctx = self.ctx.load(Ordering::Acquire);
        if ctx.is_null() {
            // Power-off requested before bootstrap finished; nothing to
            // tear down yet.
            warn!("shutdown: fired before arm, skipping subsystem teardown");
        } else {
            // SAFETY: `arm` stored a leaked &'static AppContext.
            let ctx = unsafe { &*ctx };

            // Reverse-of-acquisition order.  shutdown_steal bypasses the
            // owner tags; sound because the fired latch makes this path
            // run at most once and power-off follows immediately.
            unsafe { ctx.radio.shutdown_steal() }.power_down();
            unsafe { ctx.ui.shutdown_steal() }.power_down();
        }

        self.platform.power_off();
        true
    }
}

// ---------------------------------------------------------------------------
// Power-off setting listener
// ---------------------------------------------------------------------------

/// The supervisor's own settings listener: writing `PowerOff = true`
/// fires the coordinator.  Runs on whichever task changed the setting.
pub struct PowerOffListener {
    coordinator: &'static ShutdownCoordinator,
}

impl PowerOffListener {
    pub fn new(coordinator: &'static ShutdownCoordinator) -> Self {
        Self { coordinator }
    }
}

impl SettingListener for PowerOffListener {
    fn on_setting_changed(&self, change: &SettingChange) {
        if change.key == SettingKey::PowerOff && change.value.as_bool() {
            self.coordinator.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as TestOrdering};
    use std::sync::Arc;

    struct CountingPlatform {
        power_offs: Arc<AtomicU32>,
    }

    impl PlatformPort for CountingPlatform {
        fn power_off(&self) {
            self.power_offs.fetch_add(1, TestOrdering::SeqCst);
        }

        fn restart(&self) -> ! {
            unreachable!("restart not exercised in latch tests");
        }
    }

    fn counting_coordinator() -> (ShutdownCoordinator, Arc<AtomicU32>) {
        let power_offs = Arc::new(AtomicU32::new(0));
        let coordinator = ShutdownCoordinator::new(Box::new(CountingPlatform {
            power_offs: Arc::clone(&power_offs),
        }));
        (coordinator, power_offs)
    }

    #[test]
    fn latch_fires_exactly_once() {
        let (coordinator, power_offs) = counting_coordinator();
        assert_eq!(coordinator.state(), ShutdownState::Armed);

        assert!(coordinator.fire());
        assert_eq!(coordinator.state(), ShutdownState::Fired);
        assert!(!coordinator.fire(), "second trigger is a no-op");
        assert_eq!(power_offs.load(TestOrdering::SeqCst), 1);
    }

    #[test]
    fn concurrent_triggers_tear_down_once() {
        let (coordinator, power_offs) = counting_coordinator();
        let coordinator: &'static ShutdownCoordinator = Box::leak(Box::new(coordinator));

        let threads: Vec<_> = (0..2)
            .map(|_| std::thread::spawn(move || coordinator.fire()))
            .collect();
        let wins: Vec<bool> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
        assert_eq!(power_offs.load(TestOrdering::SeqCst), 1);
    }

    #[test]
    fn power_off_listener_fires_on_true_only() {
        let (coordinator, power_offs) = counting_coordinator();
        let coordinator: &'static ShutdownCoordinator = Box::leak(Box::new(coordinator));
        let listener = PowerOffListener::new(coordinator);

        listener.on_setting_changed(&SettingChange {
            key: SettingKey::BeeperEnabled,
            value: crate::settings::SettingValue::Bool(true),
        });
        assert_eq!(coordinator.state(), ShutdownState::Armed);

        listener.on_setting_changed(&SettingChange {
            key: SettingKey::PowerOff,
            value: crate::settings::SettingValue::Bool(true),
        });
        assert_eq!(coordinator.state(), ShutdownState::Fired);
        assert_eq!(power_offs.load(TestOrdering::SeqCst), 1);
    }
}
