//! Link protocol subsystem ("air link").
//!
//! Binds the persisted device address to reliable message exchange over
//! the radio.  Wire format and retransmission live below this layer; what
//! the supervisor cares about is the lifecycle (init with the address,
//! update on the link task, settings application) and the airtime path:
//! the link task never touches the radio.  Outbound frames go into the
//! [`FrameRing`], a lock-free SPSC ring drained by the control-input task,
//! which owns all radio airtime.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use log::info;

use crate::config::DeviceAddress;
use crate::context::SystemStatus;
use crate::error::LinkError;

/// Payload capacity of one link frame.
pub const MAX_LINK_PAYLOAD: usize = 48;

/// Encoded frame ceiling: header + payload + checksum.
pub const MAX_ENCODED_FRAME: usize = MAX_LINK_PAYLOAD + 11;

/// Heartbeat cadence on the link task's 10 ms update clock.
const HEARTBEAT_INTERVAL_MS: u32 = 100;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FrameKind {
    #[default]
    Heartbeat = 0x01,
    /// Peer discovery advertisement.
    Discovery = 0x02,
    /// Pairing response to a discovered peer.
    PairResponse = 0x03,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFrame {
    pub kind: FrameKind,
    pub seq: u16,
    pub src: [u8; 6],
    pub payload: heapless::Vec<u8, MAX_LINK_PAYLOAD>,
}

impl LinkFrame {
    /// Wire layout: `'S' kind seq_lo seq_hi src[6] len payload… xor`.
    pub fn encode(&self, buf: &mut [u8; MAX_ENCODED_FRAME]) -> usize {
        buf[0] = b'S';
        buf[1] = self.kind as u8;
        buf[2] = self.seq as u8;
        buf[3] = (self.seq >> 8) as u8;
        buf[4..10].copy_from_slice(&self.src);
        buf[10] = self.payload.len() as u8;
        let end = 11 + self.payload.len();
        buf[11..end].copy_from_slice(&self.payload);

        let mut xor = 0u8;
        for b in &buf[..end] {
            xor ^= b;
        }
        buf[end] = xor;
        end + 1
    }
}

// ---------------------------------------------------------------------------
// FrameRing — SPSC, link task → control task
// ---------------------------------------------------------------------------

/// Ring capacity.  Power of 2 for efficient index modulo.
const RING_CAP: usize = 8;

/// Lock-free single-producer/single-consumer frame ring.
///
/// Producer is the link task, consumer is the control-input task; the
/// atomics enforce the SPSC discipline, no lock touches the
/// watchdog-critical consumer side.
pub struct FrameRing {
    head: AtomicU8,
    tail: AtomicU8,
    // SAFETY: each slot is written only by the producer while it is not
    // visible to the consumer (between reading tail and publishing head),
    // and read only by the consumer while it is not visible to the
    // producer.  The head/tail atomics order those phases.
    slots: [UnsafeCell<LinkFrame>; RING_CAP],
}

// SAFETY: the SPSC discipline above makes shared access sound.
unsafe impl Sync for FrameRing {}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRing {
    pub fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: core::array::from_fn(|_| UnsafeCell::new(LinkFrame::default())),
        }
    }

    /// Producer side.  Returns `false` when the ring is full (frame
    /// dropped; the link protocol keeps its own drop counter).
    pub fn push(&self, frame: LinkFrame) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % RING_CAP as u8;

        if next_head == tail {
            return false;
        }

        // SAFETY: slot at `head` is outside the consumer's visible range.
        unsafe {
            *self.slots[head as usize].get() = frame;
        }
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<LinkFrame> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        // SAFETY: slot at `tail` was published by the producer's Release
        // store to head.
        let frame = unsafe { (*self.slots[tail as usize].get()).clone() };
        self.tail.store((tail + 1) % RING_CAP as u8, Ordering::Release);
        Some(frame)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + RING_CAP - tail) % RING_CAP
    }
}

// ---------------------------------------------------------------------------
// Link protocol subsystem
// ---------------------------------------------------------------------------

pub struct LinkProtocol {
    addr: Option<DeviceAddress>,
    seq: u16,
    rf_power_dbm: u8,
    last_heartbeat_ms: u32,
    frames_queued: u32,
    frames_dropped: u32,
}

impl Default for LinkProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkProtocol {
    pub fn new() -> Self {
        Self {
            addr: None,
            seq: 0,
            rf_power_dbm: 14,
            last_heartbeat_ms: 0,
            frames_queued: 0,
            frames_dropped: 0,
        }
    }

    /// Bind the persisted device address.  Must not run before the
    /// address is available from the config store.
    pub fn init(&mut self, addr: DeviceAddress) -> Result<(), LinkError> {
        self.addr = Some(addr);
        info!("link: bound to {addr}");
        Ok(())
    }

    pub fn addr(&self) -> Option<DeviceAddress> {
        self.addr
    }

    /// Desired radio TX power; mirrored into [`SystemStatus`] by the
    /// settings listener and applied by the control task.
    pub fn set_rf_power(&mut self, dbm: u8) {
        self.rf_power_dbm = dbm;
    }

    pub fn rf_power_dbm(&self) -> u8 {
        self.rf_power_dbm
    }

    pub fn frames_queued(&self) -> u32 {
        self.frames_queued
    }

    pub fn frames_dropped(&self) -> u32 {
        self.frames_dropped
    }

    /// Queue a frame for transmission by the control task.
    pub fn enqueue(
        &mut self,
        kind: FrameKind,
        payload: &[u8],
        tx: &FrameRing,
    ) -> Result<(), LinkError> {
        let addr = self.addr.ok_or(LinkError::NotBound)?;
        let mut frame = LinkFrame {
            kind,
            seq: self.seq,
            src: addr.0,
            payload: heapless::Vec::new(),
        };
        frame
            .payload
            .extend_from_slice(payload)
            .map_err(|()| LinkError::PayloadTooLong)?;

        if !tx.push(frame) {
            self.frames_dropped = self.frames_dropped.wrapping_add(1);
            return Err(LinkError::QueueFull);
        }
        self.seq = self.seq.wrapping_add(1);
        self.frames_queued = self.frames_queued.wrapping_add(1);
        Ok(())
    }

    /// One link-task iteration: emit the periodic heartbeat.
    pub fn update(&mut self, now_ms: u32, tx: &FrameRing, status: &SystemStatus) {
        if self.addr.is_none() {
            return;
        }
        if now_ms.wrapping_sub(self.last_heartbeat_ms) >= HEARTBEAT_INTERVAL_MS {
            self.last_heartbeat_ms = now_ms;
            let _ = self.enqueue(FrameKind::Heartbeat, &[], tx);
        }
        status.set_link_up(true);
    }
}
