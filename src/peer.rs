//! Peer discovery and pairing service, layered on the link protocol.
//!
//! Bound to the link at bootstrap, but **started** from the link task's
//! first iteration — advertising must not begin before the task that
//! services replies is running.  The pairing window opens and closes with
//! the `PairingEnabled` setting.

use log::info;

use crate::config::DeviceAddress;
use crate::context::SystemStatus;
use crate::error::LinkError;
use crate::link::{FrameKind, FrameRing, LinkProtocol};

/// Upper bound on remembered peers.
pub const MAX_PEERS: usize = 4;

/// Discovery advertisement cadence while pairing is enabled.
const DISCOVERY_INTERVAL_MS: u32 = 500;

/// A peer goes stale when silent this long.
const PEER_TIMEOUT_MS: u32 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: DeviceAddress,
    pub last_seen_ms: u32,
    pub paired: bool,
}

pub struct PeerService {
    started: bool,
    last_discovery_ms: u32,
    peers: heapless::Vec<PeerInfo, MAX_PEERS>,
}

impl Default for PeerService {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerService {
    pub fn new() -> Self {
        Self {
            started: false,
            last_discovery_ms: 0,
            peers: heapless::Vec::new(),
        }
    }

    /// Bind to the link protocol.  Requires the link to hold an address
    /// already — bootstrap ordering guarantees it.
    pub fn init(&mut self, link: &LinkProtocol) -> Result<(), LinkError> {
        let addr = link.addr().ok_or(LinkError::NotBound)?;
        info!("peer: bound to link {addr}");
        Ok(())
    }

    /// Begin advertising.  Called once, from the link task's first
    /// iteration.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            info!("peer: service started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    /// Record activity from a peer (rx path).  New peers are admitted
    /// only while pairing is enabled.
    pub fn note_peer(&mut self, addr: DeviceAddress, now_ms: u32, pairing_enabled: bool) {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.addr == addr) {
            peer.last_seen_ms = now_ms;
            return;
        }
        if !pairing_enabled {
            return;
        }
        let _ = self.peers.push(PeerInfo {
            addr,
            last_seen_ms: now_ms,
            paired: true,
        });
        info!("peer: paired with {addr}");
    }

    /// One link-task iteration: advertise while the pairing window is
    /// open, expire stale peers, publish counts.
    pub fn update(
        &mut self,
        now_ms: u32,
        link: &mut LinkProtocol,
        tx: &FrameRing,
        status: &SystemStatus,
        pairing_enabled: bool,
    ) {
        if !self.started {
            return;
        }

        if pairing_enabled
            && now_ms.wrapping_sub(self.last_discovery_ms) >= DISCOVERY_INTERVAL_MS
        {
            self.last_discovery_ms = now_ms;
            let _ = link.enqueue(FrameKind::Discovery, &[], tx);
        }

        self.peers
            .retain(|p| now_ms.wrapping_sub(p.last_seen_ms) < PEER_TIMEOUT_MS);

        status.set_pairing_active(pairing_enabled);
        status.set_paired_peers(self.peers.len() as u8);
    }
}
