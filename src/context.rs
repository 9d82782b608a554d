//! Application context and the single-writer ownership discipline.
//!
//! One [`AppContext`] is built by the bootstrapper, leaked to `'static`,
//! and borrowed — never copied — by every task.  No locks are used
//! anywhere in this layer.  Safety rests on two explicit contracts:
//!
//! 1. **Single writer per handle.**  Each subsystem handle is wrapped in a
//!    [`TaskOwned`] cell whose owner tag records the one task allowed to
//!    mutate it.  Debug builds assert the tag on every access.
//! 2. **Lock-free cross-task accessors.**  State another task needs is
//!    published through [`SystemStatus`] atomics or the [`InputMailbox`],
//!    never read out of a foreign handle.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, AtomicU64, Ordering};

use crate::companion::CompanionLink;
use crate::config::ConfigStore;
use crate::drivers::radio::Radio;
use crate::link::{FrameRing, LinkProtocol};
use crate::peer::PeerService;
use crate::rc::ControlInput;
use crate::settings::SettingsRegistry;
use crate::ui::UiSystem;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// The four long-lived tasks.  Values double as owner tags in
/// [`TaskOwned`] cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskId {
    /// Highest-frequency task: samples inputs, drives the radio,
    /// renews the watchdog.  Pinned to the APP core.
    ControlInput = 0,
    /// Link-protocol task; also runs the peer service and settings
    /// persistence.  Pinned to the PRO core.
    LinkProtocol = 1,
    /// Companion wireless input path.  Pinned to the PRO core.
    CompanionLink = 2,
    /// UI rendering; created strictly after the other three.
    Ui = 3,
}

const OWNER_UNBOUND: u8 = 0xFF;

std::thread_local! {
    static CURRENT_TASK: core::cell::Cell<Option<TaskId>> = const { core::cell::Cell::new(None) };
}

impl TaskId {
    /// Record this task identity for the calling thread.  Called once at
    /// the top of each task entry function, before any handle is touched.
    pub fn enter(self) {
        CURRENT_TASK.with(|c| {
            debug_assert!(
                c.get().is_none() || c.get() == Some(self),
                "thread already entered as {:?}",
                c.get()
            );
            c.set(Some(self));
        });
    }

    /// The task identity of the calling thread, if it entered one.
    pub fn current() -> Option<TaskId> {
        CURRENT_TASK.with(core::cell::Cell::get)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ControlInput => "rc",
            Self::LinkProtocol => "link",
            Self::CompanionLink => "companion",
            Self::Ui => "ui",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskOwned — single-writer cell
// ---------------------------------------------------------------------------

/// A subsystem handle with exactly one designated mutator task.
///
/// The cell starts unbound; the owning task calls [`bind`](Self::bind)
/// once at entry, and from then on every [`with`](Self::with) access
/// asserts (in debug builds) that the caller is that task.  Other tasks
/// must go through the subsystem's own lock-free accessors instead.
///
/// The shutdown path is the one documented exception: see
/// [`shutdown_steal`](Self::shutdown_steal).
pub struct TaskOwned<T> {
    cell: UnsafeCell<T>,
    owner: AtomicU8,
}

// SAFETY: the single-writer contract — one binding task issues all
// mutable accesses; cross-task reads go through the subsystem's own
// atomics — makes shared references to the cell sound for T: Send.
unsafe impl<T: Send> Sync for TaskOwned<T> {}

impl<T> TaskOwned<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: UnsafeCell::new(value),
            owner: AtomicU8::new(OWNER_UNBOUND),
        }
    }

    /// Bind the designated mutator.  Called once, from that task, before
    /// its first access.  Binding twice from different tasks is a bug.
    pub fn bind(&self, task: TaskId) {
        let prev = self
            .owner
            .compare_exchange(
                OWNER_UNBOUND,
                task as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .unwrap_or_else(|cur| cur);
        debug_assert!(
            prev == OWNER_UNBOUND || prev == task as u8,
            "handle already bound to task {prev}, rebind from {:?}",
            task
        );
    }

    /// The owner tag, if bound.
    pub fn owner(&self) -> Option<TaskId> {
        match self.owner.load(Ordering::Acquire) {
            0 => Some(TaskId::ControlInput),
            1 => Some(TaskId::LinkProtocol),
            2 => Some(TaskId::CompanionLink),
            3 => Some(TaskId::Ui),
            _ => None,
        }
    }

    /// Mutable access for the designated task.
    ///
    /// Debug builds assert that the calling thread entered as the bound
    /// owner.  Release builds rely on the contract alone, which keeps the
    /// watchdog-critical path free of checks.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        debug_assert_eq!(
            self.owner.load(Ordering::Acquire),
            TaskId::current().map_or(OWNER_UNBOUND, |t| t as u8),
            "TaskOwned accessed from a task that is not its designated mutator"
        );
        // SAFETY: per the single-writer contract only the bound task calls
        // `with`, so no aliasing mutable access can exist.
        let value = unsafe { &mut *self.cell.get() };
        f(value)
    }

    /// Mutable access for the shutdown path, bypassing the owner check.
    ///
    /// # Safety
    ///
    /// Caller must hold the fired shutdown latch (guaranteeing this runs
    /// at most once) and must only perform idempotent power-down work.
    /// Shutdown is fire-and-forget: a concurrent access from the owner
    /// task is tolerated because the platform power-off that follows
    /// halts every task.
    pub unsafe fn shutdown_steal(&self) -> &mut T {
        unsafe { &mut *self.cell.get() }
    }
}

// ---------------------------------------------------------------------------
// SystemStatus — lock-free read-side snapshot
// ---------------------------------------------------------------------------

/// Subsystem ready bits, set at the end of each subsystem's `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Subsystem {
    Link = 0b0000_0001,
    Peer = 0b0000_0010,
    ControlInput = 0b0000_0100,
    Companion = 0b0000_1000,
    Ui = 0b0001_0000,
}

const CORE_READY_MASK: u8 = Subsystem::Link as u8
    | Subsystem::Peer as u8
    | Subsystem::ControlInput as u8
    | Subsystem::Companion as u8;

/// Values published by owning tasks for any task to read.
///
/// This is the concrete form of the "subsystem-provided thread-safe
/// accessor" the single-writer model requires: the UI and companion
/// tasks render from here instead of reaching into foreign handles.
#[derive(Default)]
pub struct SystemStatus {
    ready: AtomicU8,
    link_up: AtomicBool,
    packet_rate_hz: AtomicU16,
    rc_frames: AtomicU32,
    link_quality: AtomicU8,
    paired_peers: AtomicU8,
    pairing_active: AtomicBool,
    companion_active: AtomicBool,
    /// Desired TX power; written by the settings listener on whatever
    /// task changed it, applied to the radio by the control task.
    rf_power_dbm: AtomicU8,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self, s: Subsystem) {
        self.ready.fetch_or(s as u8, Ordering::AcqRel);
    }

    pub fn is_ready(&self, s: Subsystem) -> bool {
        self.ready.load(Ordering::Acquire) & s as u8 != 0
    }

    /// All subsystems the UI renders from are initialized.
    pub fn core_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) & CORE_READY_MASK == CORE_READY_MASK
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Release);
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn set_packet_rate_hz(&self, hz: u16) {
        self.packet_rate_hz.store(hz, Ordering::Release);
    }

    pub fn packet_rate_hz(&self) -> u16 {
        self.packet_rate_hz.load(Ordering::Acquire)
    }

    pub fn bump_rc_frames(&self) {
        self.rc_frames.fetch_add(1, Ordering::AcqRel);
    }

    pub fn rc_frames(&self) -> u32 {
        self.rc_frames.load(Ordering::Acquire)
    }

    pub fn set_link_quality(&self, lq: u8) {
        self.link_quality.store(lq, Ordering::Release);
    }

    pub fn link_quality(&self) -> u8 {
        self.link_quality.load(Ordering::Acquire)
    }

    pub fn set_paired_peers(&self, n: u8) {
        self.paired_peers.store(n, Ordering::Release);
    }

    pub fn paired_peers(&self) -> u8 {
        self.paired_peers.load(Ordering::Acquire)
    }

    pub fn set_pairing_active(&self, active: bool) {
        self.pairing_active.store(active, Ordering::Release);
    }

    pub fn pairing_active(&self) -> bool {
        self.pairing_active.load(Ordering::Acquire)
    }

    pub fn set_companion_active(&self, active: bool) {
        self.companion_active.store(active, Ordering::Release);
    }

    pub fn companion_active(&self) -> bool {
        self.companion_active.load(Ordering::Acquire)
    }

    pub fn set_rf_power_dbm(&self, dbm: u8) {
        self.rf_power_dbm.store(dbm, Ordering::Release);
    }

    pub fn rf_power_dbm(&self) -> u8 {
        self.rf_power_dbm.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// InputMailbox — companion → control input
// ---------------------------------------------------------------------------

/// One decoded companion input frame: four channels, stick range 0–2047.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub channels: [u16; 4],
}

impl InputFrame {
    fn pack(self) -> u64 {
        let c = self.channels;
        u64::from(c[0])
            | u64::from(c[1]) << 16
            | u64::from(c[2]) << 32
            | u64::from(c[3]) << 48
    }

    fn unpack(raw: u64) -> Self {
        Self {
            channels: [
                raw as u16,
                (raw >> 16) as u16,
                (raw >> 32) as u16,
                (raw >> 48) as u16,
            ],
        }
    }
}

/// Latest-value mailbox from the companion task to the control task.
///
/// Single producer (companion task), single consumer (control task).
/// The whole frame fits one `AtomicU64`, so a reader can never observe
/// a torn frame; the sequence counter tells the consumer whether the
/// frame is fresh since its last take.
#[derive(Default)]
pub struct InputMailbox {
    frame: AtomicU64,
    seq: AtomicU32,
}

impl InputMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame.  Companion task only.
    pub fn publish(&self, frame: InputFrame) {
        self.frame.store(frame.pack(), Ordering::Release);
        self.seq.fetch_add(1, Ordering::AcqRel);
    }

    /// Return the latest frame if it is newer than `last_seen`, updating
    /// `last_seen`.  Control task only.
    pub fn take_fresh(&self, last_seen: &mut u32) -> Option<InputFrame> {
        let seq = self.seq.load(Ordering::Acquire);
        if seq == *last_seen {
            return None;
        }
        *last_seen = seq;
        Some(InputFrame::unpack(self.frame.load(Ordering::Acquire)))
    }

    /// Sequence counter, for staleness checks.
    pub fn seq(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// The single set of exclusively-owned subsystem handles, plus the
/// lock-free cross-task surfaces.  Built once by the bootstrapper and
/// torn down exactly once by the shutdown coordinator.
pub struct AppContext {
    pub settings: SettingsRegistry,
    /// Leaked separately during bootstrap so settings listeners can hold
    /// it before the context exists.
    pub status: &'static SystemStatus,
    pub companion_input: InputMailbox,
    /// Link task produces, control task drains into radio airtime.
    pub link_tx: FrameRing,

    /// NVS store; owned by the link task after boot (settings persistence).
    pub config: TaskOwned<ConfigStore>,
    /// Radio handle; driver-initialized inside the control task.
    pub radio: TaskOwned<Radio>,
    pub rc: TaskOwned<ControlInput>,
    pub link: TaskOwned<LinkProtocol>,
    pub peer: TaskOwned<PeerService>,
    pub companion: TaskOwned<CompanionLink>,
    pub ui: TaskOwned<UiSystem>,
}
