//! Settings registry: typed key/value store with synchronous change dispatch.
//!
//! Any component may register a listener for change notifications during
//! bootstrap.  After bootstrap the registry is only reachable through a
//! shared reference, so the listener table is frozen by construction —
//! registration requires `&mut self`.
//!
//! ## Dispatch contract
//!
//! [`SettingsRegistry::set`] invokes every matching listener **synchronously,
//! in registration order, on the calling task** — no queue, no deferral.
//! A listener therefore runs on whichever task changed the setting (UI
//! button handler, companion command decoder, ...) and must be fast,
//! non-blocking, and caller-agnostic.  Slow work belongs in the listener's
//! own subsystem, signalled through an atomic.
//!
//! Values are packed into per-key `AtomicU32` slots so reads from any task
//! are lock-free.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::debug;

use crate::config::SettingsSnapshot;

/// Maximum number of registered listeners.
const MAX_LISTENERS: usize = 8;

// ---------------------------------------------------------------------------
// Keys and values
// ---------------------------------------------------------------------------

/// Every tunable the supervisor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SettingKey {
    /// Power-off command.  Writing `true` triggers coordinated shutdown.
    /// Not persisted.
    PowerOff = 0,
    /// Radio transmit power in dBm.
    RfPowerDbm = 1,
    /// Whether the peer service accepts pairing requests.
    PairingEnabled = 2,
    /// OLED contrast, 0–255.
    ScreenBrightness = 3,
    /// Whether the beeper is audible.
    BeeperEnabled = 4,
}

pub const SETTING_COUNT: usize = 5;

impl SettingKey {
    const fn slot(self) -> usize {
        self as usize
    }
}

/// A setting's current value.  Packed into one `u32` for atomic storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    U8(u8),
}

impl SettingValue {
    fn pack(self) -> u32 {
        match self {
            Self::Bool(false) => 0,
            Self::Bool(true) => 1,
            Self::U8(v) => u32::from(v),
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::U8(v) => v != 0,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Bool(b) => u8::from(b),
            Self::U8(v) => v,
        }
    }
}

/// A single change notification passed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub value: SettingValue,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Change-notification callback.
///
/// Invoked synchronously on the task that called [`SettingsRegistry::set`];
/// implementations must not assume a particular caller task, must not
/// block, and must be `Sync` because any task may be the caller.
pub trait SettingListener: Sync {
    fn on_setting_changed(&self, change: &SettingChange);
}

/// Which keys a listener wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatcher {
    /// Every key.
    Any,
    /// Exactly one key.
    Exact(SettingKey),
}

impl KeyMatcher {
    fn matches(self, key: SettingKey) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(k) => k == key,
        }
    }
}

/// Returned when the listener table is out of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTableFull;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct SettingsRegistry {
    values: [AtomicU32; SETTING_COUNT],
    /// Set by `set()`, cleared by the persistence owner (link task).
    dirty: AtomicBool,
    listeners: heapless::Vec<(KeyMatcher, &'static dyn SettingListener), MAX_LISTENERS>,
}

impl SettingsRegistry {
    /// Build the registry from a persisted snapshot.  `PowerOff` always
    /// starts `false`.
    pub fn from_snapshot(snap: &SettingsSnapshot) -> Self {
        let values = [
            AtomicU32::new(0), // PowerOff
            AtomicU32::new(u32::from(snap.rf_power_dbm)),
            AtomicU32::new(u32::from(snap.pairing_enabled)),
            AtomicU32::new(u32::from(snap.screen_brightness)),
            AtomicU32::new(u32::from(snap.beeper_enabled)),
        ];
        Self {
            values,
            dirty: AtomicBool::new(false),
            listeners: heapless::Vec::new(),
        }
    }

    /// Register a `(matcher, listener)` pair.  Only possible during
    /// bootstrap, while the registry is still exclusively owned; listeners
    /// are invoked in registration order.
    pub fn register_listener(
        &mut self,
        matcher: KeyMatcher,
        listener: &'static dyn SettingListener,
    ) -> Result<(), ListenerTableFull> {
        self.listeners
            .push((matcher, listener))
            .map_err(|_| ListenerTableFull)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Current value of `key`.
    pub fn value_of(&self, key: SettingKey) -> SettingValue {
        let raw = self.values[key.slot()].load(Ordering::Acquire);
        match key {
            SettingKey::PowerOff | SettingKey::PairingEnabled | SettingKey::BeeperEnabled => {
                SettingValue::Bool(raw != 0)
            }
            SettingKey::RfPowerDbm | SettingKey::ScreenBrightness => SettingValue::U8(raw as u8),
        }
    }

    /// Store `value` and, if it differs from the previous value, invoke
    /// every matching listener in registration order on the calling task.
    ///
    /// Two tasks racing to store the same value produce exactly one
    /// dispatch: the atomic swap hands the old value to exactly one of
    /// them.
    pub fn set(&self, key: SettingKey, value: SettingValue) {
        let packed = value.pack();
        let prev = self.values[key.slot()].swap(packed, Ordering::AcqRel);
        if prev == packed {
            return;
        }

        self.dirty.store(true, Ordering::Release);
        debug!("settings: {:?} -> {:?}", key, value);

        let change = SettingChange { key, value };
        for (matcher, listener) in &self.listeners {
            if matcher.matches(key) {
                listener.on_setting_changed(&change);
            }
        }
    }

    // ── Typed accessors ───────────────────────────────────────

    pub fn rf_power_dbm(&self) -> u8 {
        self.value_of(SettingKey::RfPowerDbm).as_u8()
    }

    pub fn pairing_enabled(&self) -> bool {
        self.value_of(SettingKey::PairingEnabled).as_bool()
    }

    pub fn screen_brightness(&self) -> u8 {
        self.value_of(SettingKey::ScreenBrightness).as_u8()
    }

    pub fn beeper_enabled(&self) -> bool {
        self.value_of(SettingKey::BeeperEnabled).as_bool()
    }

    // ── Persistence ───────────────────────────────────────────

    /// Snapshot of the persistable settings (excludes `PowerOff`).
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            rf_power_dbm: self.rf_power_dbm(),
            pairing_enabled: self.pairing_enabled(),
            screen_brightness: self.screen_brightness(),
            beeper_enabled: self.beeper_enabled(),
        }
    }

    /// Clear and return the dirty flag.  Called by the task that owns
    /// settings persistence.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}
