//! Monotonic time.
//!
//! Wraps `esp_timer_get_time()` on the device (microsecond-resolution
//! monotonic counter) and `std::time::Instant` on the host.  Each task
//! keeps its own clock; they agree because both count from boot.

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot, truncated to the u32 the subsystems use
    /// (wraps after ~49 days; all comparisons are wrapping).
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u32 {
        ((unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000) as u32
    }

    /// Milliseconds since boot (host).
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Seconds since boot.
    pub fn uptime_secs(&self) -> u64 {
        u64::from(self.now_ms()) / 1_000
    }
}
