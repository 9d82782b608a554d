//! Task watchdog lease and deadline-renewal strategies.
//!
//! The control-input task acquires one [`WatchdogLease`] at task entry and
//! renews it on every loop iteration.  A missed deadline is a safety
//! fault: the TWDT is configured to panic, which resets the chip.  There
//! is deliberately no software recovery — a stalled control loop in a
//! handheld transmitter must hard-reset.
//!
//! Renewal is pluggable so the one permitted layering exception is
//! visible instead of being an unexplained special case:
//!
//! - [`TaskWdtRenewal`] — the generic `esp_task_wdt_reset` path, fine for
//!   any task that sleeps.
//! - [`RegisterFeedRenewal`] — a direct write to the TIMG0 feed register.
//!   The control loop runs with no sleep at all; the generic call's
//!   overhead per iteration is large enough relative to the loop period
//!   to threaten the very deadline it proves.  Only the control task may
//!   use this strategy.
//! - [`SimWatchdog`] — host-side deadline monitor with the same
//!   trip-at-or-after-deadline semantics, for tests.

use crate::error::InitError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

/// TWDT deadline for the control loop.
pub const WATCHDOG_TIMEOUT_MS: u32 = 3_000;

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// How a lease proves liveness before its deadline.
pub trait DeadlineRenewal {
    /// Subscribe the calling task to the deadline timer.  Called once,
    /// from the task that will renew.
    fn register(&mut self) -> Result<(), InitError>;

    /// Renew the lease.  Must complete strictly before the deadline.
    fn renew(&mut self);
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Binding between one task and a renewal deadline.
pub struct WatchdogLease<R: DeadlineRenewal> {
    renewal: R,
}

impl<R: DeadlineRenewal> WatchdogLease<R> {
    /// Subscribe the calling task and hand back the lease.
    pub fn acquire(mut renewal: R) -> Result<Self, InitError> {
        renewal.register()?;
        Ok(Self { renewal })
    }

    /// Renew the lease.  Call once per loop iteration.
    pub fn renew(&mut self) {
        self.renewal.renew();
    }
}

// ---------------------------------------------------------------------------
// Generic TWDT renewal
// ---------------------------------------------------------------------------

/// Default strategy: the ESP-IDF task watchdog API.
#[derive(Default)]
pub struct TaskWdtRenewal {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl TaskWdtRenewal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeadlineRenewal for TaskWdtRenewal {
    fn register(&mut self) -> Result<(), InitError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: TWDT reconfigure/add are called once from the task
            // being subscribed, before its loop starts.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: WATCHDOG_TIMEOUT_MS,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("watchdog: reconfigure returned {ret} (may already be configured)");
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                if ret != ESP_OK {
                    return Err(InitError::Watchdog(ret));
                }
                self.subscribed = true;
                info!(
                    "watchdog: task subscribed ({WATCHDOG_TIMEOUT_MS} ms, panic on trigger)"
                );
            }
        }
        Ok(())
    }

    fn renew(&mut self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: plain TWDT reset for the subscribed task.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Direct register feed — control task only
// ---------------------------------------------------------------------------

/// TIMG0 watchdog feed registers (ESP32-S3).
#[cfg(target_os = "espidf")]
mod timg0 {
    const TIMG0_BASE: usize = 0x6001_F000;
    pub const WDTWPROTECT_REG: *mut u32 = (TIMG0_BASE + 0x0064) as *mut u32;
    pub const WDTFEED_REG: *mut u32 = (TIMG0_BASE + 0x0060) as *mut u32;
    /// Write-protect key for the watchdog register block.
    pub const WDT_WKEY: u32 = 0x50D8_3AA1;
}

/// The control loop's renewal strategy: unlock, feed, re-lock the TIMG0
/// watchdog registers directly.  Subscription still goes through the
/// TWDT API; only the per-iteration feed bypasses it.
#[derive(Default)]
pub struct RegisterFeedRenewal {
    inner: TaskWdtRenewal,
}

impl RegisterFeedRenewal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeadlineRenewal for RegisterFeedRenewal {
    fn register(&mut self) -> Result<(), InitError> {
        self.inner.register()
    }

    #[inline(always)]
    fn renew(&mut self) {
        #[cfg(target_os = "espidf")]
        // SAFETY: MMIO feed sequence; the register block is unlocked only
        // for the duration of the feed write.  Sound from any single task;
        // only the control task uses this strategy.
        unsafe {
            core::ptr::write_volatile(timg0::WDTWPROTECT_REG, timg0::WDT_WKEY);
            core::ptr::write_volatile(timg0::WDTFEED_REG, 1);
            core::ptr::write_volatile(timg0::WDTWPROTECT_REG, 0);
        }
    }
}

// ---------------------------------------------------------------------------
// Host simulation
// ---------------------------------------------------------------------------

/// Deadline monitor with hardware-watchdog semantics for host tests:
/// [`expired`](Self::expired) is `false` until strictly after the
/// deadline has passed without a renewal, then stays `true` until the
/// next renewal.  Clones share the same renewal state, so a test can
/// keep a handle while the lease owns the strategy.
#[cfg(not(target_os = "espidf"))]
#[derive(Clone)]
pub struct SimWatchdog {
    deadline: std::time::Duration,
    epoch: std::time::Instant,
    last_renew_us: std::sync::Arc<core::sync::atomic::AtomicU64>,
}

#[cfg(not(target_os = "espidf"))]
impl SimWatchdog {
    pub fn new(deadline: std::time::Duration) -> Self {
        Self {
            deadline,
            epoch: std::time::Instant::now(),
            last_renew_us: std::sync::Arc::new(core::sync::atomic::AtomicU64::new(0)),
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Time since the last renewal (or since registration).
    pub fn since_renew(&self) -> std::time::Duration {
        let last = self
            .last_renew_us
            .load(core::sync::atomic::Ordering::Acquire);
        std::time::Duration::from_micros(self.now_us().saturating_sub(last))
    }

    /// Whether the deadline has been missed.
    pub fn expired(&self) -> bool {
        self.since_renew() > self.deadline
    }
}

#[cfg(not(target_os = "espidf"))]
impl DeadlineRenewal for SimWatchdog {
    fn register(&mut self) -> Result<(), InitError> {
        let now = self.now_us();
        self.last_renew_us
            .store(now, core::sync::atomic::Ordering::Release);
        Ok(())
    }

    fn renew(&mut self) {
        let now = self.now_us();
        self.last_renew_us
            .store(now, core::sync::atomic::Ordering::Release);
    }
}
