//! Persistent configuration store (NVS) and device identity.
//!
//! The [`ConfigStore`] wraps ESP-IDF NVS behind a small blob API and is the
//! only component that touches flash.  It supplies:
//!
//! - the persisted **device address** used to bind the link protocol
//!   (derived from the factory eFuse MAC on first boot, then persisted so
//!   it survives MAC-affecting reflashes),
//! - the persisted **settings snapshot** ([`SettingsSnapshot`]) applied to
//!   the registry at boot,
//! - raw namespaced blob storage for the crash log.
//!
//! On non-ESP targets the backend is an in-memory map so every consumer
//! can be tested on the host.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const IDENT_NAMESPACE: &str = "ident";
const ADDR_KEY: &str = "air_addr";
const SETTINGS_NAMESPACE: &str = "settings";
const SETTINGS_KEY: &str = "snapshot";

const MAX_BLOB_SIZE: usize = 512;

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// Over-the-air device address: 6 bytes, unique per transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; 6]);

impl core::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> [u8; 6] {
    let mut mac = [0u8; 6];
    unsafe {
        esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> [u8; 6] {
    [0x5A, 0x11, 0x4B, 0xA3, 0x07, 0xC2]
}

/// Short human-readable device ID (`SL-XXYYZZ`, last 3 MAC bytes).
/// Used as the companion BLE advertising name.
pub fn device_id(addr: &DeviceAddress) -> heapless::String<16> {
    let mut id = heapless::String::new();
    use core::fmt::Write;
    let _ = write!(id, "SL-{:02X}{:02X}{:02X}", addr.0[3], addr.0[4], addr.0[5]);
    id
}

// ---------------------------------------------------------------------------
// Persisted settings snapshot
// ---------------------------------------------------------------------------

/// The subset of settings that survives reboot, serialized with postcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Radio transmit power in dBm (2–17 for an SX1276 on PA_BOOST).
    pub rf_power_dbm: u8,
    /// Whether the peer service accepts pairing requests.
    pub pairing_enabled: bool,
    /// OLED contrast, 0–255.
    pub screen_brightness: u8,
    /// Whether the beeper is audible.
    pub beeper_enabled: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            rf_power_dbm: 14,
            pairing_enabled: false,
            screen_brightness: 160,
            beeper_enabled: true,
        }
    }
}

/// Range-check a snapshot before it is persisted or applied.
pub fn validate_snapshot(s: &SettingsSnapshot) -> Result<(), StorageError> {
    if !(2..=17).contains(&s.rf_power_dbm) {
        return Err(StorageError::Corrupted);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

pub struct ConfigStore {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl ConfigStore {
    /// Initialise NVS flash and open the store.
    ///
    /// On first boot or after an NVS version mismatch the partition is
    /// erased and re-initialised automatically.  Returns
    /// `Err(StorageError::IoError)` only if flash is unrecoverable —
    /// a fatal boot fault.
    pub fn open() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // bootstrap context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("ConfigStore: erasing and re-initialising NVS partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("ConfigStore: NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("ConfigStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// The persisted over-the-air address.
    ///
    /// First boot derives it from the eFuse MAC and persists it; later
    /// boots return the stored value unchanged.  Link-protocol
    /// initialization must not run before this call succeeds.
    pub fn device_address(&mut self) -> Result<DeviceAddress, StorageError> {
        let mut buf = [0u8; 6];
        match self.read(IDENT_NAMESPACE, ADDR_KEY, &mut buf) {
            Ok(6) => return Ok(DeviceAddress(buf)),
            Ok(_) | Err(StorageError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let addr = DeviceAddress(read_mac());
        self.write(IDENT_NAMESPACE, ADDR_KEY, &addr.0)?;
        info!("ConfigStore: generated device address {addr}");
        Ok(addr)
    }

    /// Load the persisted settings snapshot, falling back to defaults when
    /// nothing is stored or the blob fails validation.
    pub fn load_settings(&self) -> SettingsSnapshot {
        let mut buf = [0u8; 64];
        match self.read(SETTINGS_NAMESPACE, SETTINGS_KEY, &mut buf) {
            Ok(n) => match postcard::from_bytes::<SettingsSnapshot>(&buf[..n]) {
                Ok(snap) if validate_snapshot(&snap).is_ok() => {
                    info!("ConfigStore: settings loaded ({n} bytes)");
                    snap
                }
                _ => {
                    warn!("ConfigStore: stored settings invalid, using defaults");
                    SettingsSnapshot::default()
                }
            },
            Err(StorageError::NotFound) => {
                info!("ConfigStore: no stored settings, using defaults");
                SettingsSnapshot::default()
            }
            Err(e) => {
                warn!("ConfigStore: settings read failed ({e}), using defaults");
                SettingsSnapshot::default()
            }
        }
    }

    /// Validate and persist a settings snapshot.
    pub fn save_settings(&mut self, snap: &SettingsSnapshot) -> Result<(), StorageError> {
        validate_snapshot(snap)?;
        let mut buf = [0u8; 64];
        let bytes = postcard::to_slice(snap, &mut buf).map_err(|_| StorageError::IoError)?;
        self.write(SETTINGS_NAMESPACE, SETTINGS_KEY, bytes)?;
        info!("ConfigStore: settings saved ({} bytes)", bytes.len());
        Ok(())
    }

    // ── Raw namespaced blob access ────────────────────────────

    /// Read a blob.  Returns the number of bytes written into `buf`.
    pub fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::key_cstr(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    /// Write a blob atomically (NVS commits are atomic per key).
    pub fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::key_cstr(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    // ── Internal ──────────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    /// NVS keys are limited to 15 chars; copy into a null-terminated buffer.
    #[cfg(target_os = "espidf")]
    fn key_cstr(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = key.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = Self::key_cstr(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let mut store = ConfigStore::open().unwrap();
        store.write("test_ns", "blob", b"sky").unwrap();

        let mut buf = [0u8; 16];
        let len = store.read("test_ns", "blob", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"sky");
    }

    #[test]
    fn read_missing_key() {
        let store = ConfigStore::open().unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            store.read("ns", "nope", &mut buf),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn device_address_is_stable_across_reads() {
        let mut store = ConfigStore::open().unwrap();
        let first = store.device_address().unwrap();
        let second = store.device_address().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn device_address_derives_from_mac_on_first_boot() {
        let mut store = ConfigStore::open().unwrap();
        assert_eq!(store.device_address().unwrap().0, read_mac());
    }

    #[test]
    fn settings_round_trip() {
        let mut store = ConfigStore::open().unwrap();
        let snap = SettingsSnapshot {
            rf_power_dbm: 10,
            pairing_enabled: true,
            screen_brightness: 42,
            beeper_enabled: false,
        };
        store.save_settings(&snap).unwrap();
        assert_eq!(store.load_settings(), snap);
    }

    #[test]
    fn settings_default_when_unstored() {
        let store = ConfigStore::open().unwrap();
        assert_eq!(store.load_settings(), SettingsSnapshot::default());
    }

    #[test]
    fn save_rejects_out_of_range_power() {
        let mut store = ConfigStore::open().unwrap();
        let snap = SettingsSnapshot {
            rf_power_dbm: 30,
            ..Default::default()
        };
        assert!(store.save_settings(&snap).is_err());
    }

    #[test]
    fn device_id_format() {
        let addr = DeviceAddress([0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC]);
        assert_eq!(device_id(&addr).as_str(), "SL-AABBCC");
    }
}
