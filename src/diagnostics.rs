//! Crash logging.
//!
//! A watchdog reset or panic in a handheld transmitter happens far from a
//! serial console, so the last crashes are kept in an NVS ring buffer
//! (namespace `crash`) for later inspection.  The panic hook writes an
//! entry before the default handler aborts into the reset.

use serde::{Deserialize, Serialize};

use crate::config::ConfigStore;

const CRASH_RING_SLOTS: usize = 4;
const CRASH_NAMESPACE: &str = "crash";
const CRASH_INDEX_KEY: &str = "crash_idx";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashEntry {
    pub uptime_secs: u64,
    pub reason: heapless::String<64>,
}

impl CrashEntry {
    pub fn new(uptime_secs: u64, reason: &str) -> Self {
        let mut r = heapless::String::new();
        let _ = r.push_str(&reason[..reason.len().min(63)]);
        Self {
            uptime_secs,
            reason: r,
        }
    }
}

/// NVS-backed ring buffer for crash entries.
#[derive(Default)]
pub struct CrashLog {
    write_index: usize,
}

impl CrashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index, or default to slot 0.
    pub fn init(&mut self, store: &ConfigStore) {
        let mut buf = [0u8; 4];
        if let Ok(4) = store.read(CRASH_NAMESPACE, CRASH_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % CRASH_RING_SLOTS;
        }
    }

    /// Write an entry to the next ring slot and advance the index.
    pub fn write_entry(&mut self, store: &mut ConfigStore, entry: &CrashEntry) {
        let slot_key = Self::slot_key(self.write_index);
        let mut buf = [0u8; 128];
        if let Ok(bytes) = postcard::to_slice(entry, &mut buf) {
            let _ = store.write(CRASH_NAMESPACE, &slot_key, bytes);
        }

        self.write_index = (self.write_index + 1) % CRASH_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = store.write(CRASH_NAMESPACE, CRASH_INDEX_KEY, &idx_bytes);
    }

    /// Read every stored entry.
    pub fn read_all(&self, store: &ConfigStore) -> heapless::Vec<CrashEntry, CRASH_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for i in 0..CRASH_RING_SLOTS {
            let mut buf = [0u8; 128];
            if let Ok(len) = store.read(CRASH_NAMESPACE, &Self::slot_key(i), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<CrashEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    fn slot_key(index: usize) -> heapless::String<16> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("e{index}"));
        s
    }
}

/// Install a panic hook that persists crash info before the reset.
///
/// Call once during init.  The hook opens its own NVS session; if NVS
/// was never initialized the write silently fails, which is acceptable
/// in panic context.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {reason}");

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: esp_timer_get_time is a plain counter read, safe in
            // panic context.
            let uptime = (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000;
            let entry = CrashEntry::new(uptime, reason);
            if let Ok(mut store) = ConfigStore::open() {
                let mut crash_log = CrashLog::new();
                crash_log.init(&store);
                crash_log.write_entry(&mut store, &entry);
            } else {
                log::error!("panic hook: NVS unavailable, crash entry not persisted");
            }
        }
    }));
}
