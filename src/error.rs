//! Unified error types for the SkyLink firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! supervisory layer's error handling uniform.  All variants are `Copy` so
//! they can be passed between tasks without allocation.
//!
//! The boot-time taxonomy mirrors the failure policy of the bootstrapper:
//! [`InitError`] is always fatal (boot aborts, the chip restarts), while
//! [`DegradedStart`] records an optional peripheral that was skipped.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A required subsystem failed during bootstrap.
    Init(InitError),
    /// The radio driver rejected a command or failed a bus transfer.
    Radio(RadioError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// The link protocol rejected a frame or queue operation.
    Link(LinkError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "init: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Fatal bootstrap faults
// ---------------------------------------------------------------------------

/// A required subsystem failed to initialize.
///
/// Always fatal: the bootstrapper stops at the failing step and `main()`
/// restarts the chip.  Downstream steps assume earlier ones succeeded, so
/// there is no retry and no partial startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// NVS flash could not be initialized or recovered.
    ConfigStore(StorageError),
    /// Settings registry setup failed (listener table exhausted).
    Settings(&'static str),
    /// The persisted device address could not be read or created.
    AddressUnavailable,
    /// Network/transport stack bring-up failed (rc = ESP error code).
    Netif(i32),
    /// The link protocol rejected its initial configuration.
    Link(LinkError),
    /// The control-input subsystem could not bind its sampler.
    ControlInput(&'static str),
    /// The companion transport could not be opened.
    Companion(&'static str),
    /// The UI subsystem failed beyond the optional display
    /// (button/beeper are required).
    Ui(&'static str),
    /// Watchdog lease registration was rejected (rc = ESP error code).
    Watchdog(i32),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigStore(e) => write!(f, "config store: {e}"),
            Self::Settings(msg) => write!(f, "settings: {msg}"),
            Self::AddressUnavailable => write!(f, "device address unavailable"),
            Self::Netif(rc) => write!(f, "netif init failed (rc={rc})"),
            Self::Link(e) => write!(f, "link protocol: {e}"),
            Self::ControlInput(msg) => write!(f, "control input: {msg}"),
            Self::Companion(msg) => write!(f, "companion link: {msg}"),
            Self::Ui(msg) => write!(f, "ui: {msg}"),
            Self::Watchdog(rc) => write!(f, "watchdog registration failed (rc={rc})"),
        }
    }
}

impl std::error::Error for InitError {}

impl From<InitError> for Error {
    fn from(e: InitError) -> Self {
        Self::Init(e)
    }
}

// ---------------------------------------------------------------------------
// Degraded-start warnings
// ---------------------------------------------------------------------------

/// An optional peripheral is unavailable; the dependent feature is disabled
/// and boot proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedStart {
    /// No screen answered on the I²C bus — no splash, no animations.
    DisplayAbsent,
}

impl fmt::Display for DegradedStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisplayAbsent => write!(f, "display absent — UI runs headless"),
        }
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SPI transfer failed.
    BusFault,
    /// The chip's version register did not match an SX127x part.
    UnknownChip,
    /// A command was issued before `driver_init` ran.
    DriverNotReady,
    /// TX FIFO write exceeded the frame size limit.
    FrameTooLong,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusFault => write!(f, "SPI bus fault"),
            Self::UnknownChip => write!(f, "unknown chip version"),
            Self::DriverNotReady => write!(f, "driver not initialized"),
            Self::FrameTooLong => write!(f, "frame too long"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored blob failed deserialization.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "blob corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Link protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The outbound frame ring is full (frame dropped).
    QueueFull,
    /// Payload exceeds the frame capacity.
    PayloadTooLong,
    /// The subsystem was asked to operate before `init` bound an address.
    NotBound,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::PayloadTooLong => write!(f, "payload too long"),
            Self::NotBound => write!(f, "link not bound to an address"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
