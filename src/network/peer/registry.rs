use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::mpsc;

use crate::network::peer::clock::{Clock, SystemClock};
use crate::network::peer::record::PeerRecord;

/// Registry for tracking peers and their liveness
///
/// Populated by gossip announcements and probe results; read by the
/// replication engine on every fan-out. A record expires when the peer
/// stays silent past the liveness timeout and revives on fresh contact.
pub struct PeerRegistry {
    /// Map of peer addresses to records
    peers: DashMap<SocketAddr, PeerRecord>,

    /// This node's own announced address, never registered as a peer
    local_addr: Option<SocketAddr>,

    /// Silence threshold before a record expires
    liveness_timeout: Duration,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Newly discovered peers are emitted here so the discovery task can
    /// send the reciprocal announcement
    gossip_tx: Option<mpsc::UnboundedSender<SocketAddr>>,
}

impl PeerRegistry {
    /// Create a new peer registry
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            peers: DashMap::new(),
            local_addr: None,
            liveness_timeout,
            clock: Arc::new(SystemClock),
            gossip_tx: None,
        }
    }

    /// Use the given clock instead of wall-clock time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set this node's own address so it is never registered as a peer
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Emit newly discovered peers on the given channel for reciprocal
    /// announcements
    pub fn with_gossip_channel(mut self, tx: mpsc::UnboundedSender<SocketAddr>) -> Self {
        self.gossip_tx = Some(tx);
        self
    }

    /// Upsert a peer record and refresh its liveness. Returns true when
    /// the peer was not known before; a new peer is also emitted on the
    /// gossip channel so this node announces itself back.
    pub fn announce(&self, addr: SocketAddr) -> bool {
        if self.local_addr == Some(addr) {
            return false;
        }

        let now = self.clock.now();

        if let Some(mut record) = self.peers.get_mut(&addr) {
            record.refresh(now);
            return false;
        }

        self.peers.insert(addr, PeerRecord::new(addr, now));
        info!("New peer added: {}", addr);

        if let Some(tx) = &self.gossip_tx {
            let _ = tx.send(addr);
        }

        true
    }

    /// Refresh a peer's liveness after a successful send
    pub fn mark_seen(&self, addr: SocketAddr) {
        let now = self.clock.now();
        if let Some(mut record) = self.peers.get_mut(&addr) {
            record.refresh(now);
        }
    }

    /// All currently alive peers, minus the excluded address. This is the
    /// fan-out target set.
    pub fn live_peers(&self, excluding: Option<SocketAddr>) -> Vec<SocketAddr> {
        self.peers
            .iter()
            .filter(|entry| entry.is_alive() && Some(entry.addr) != excluding)
            .map(|entry| entry.addr)
            .collect()
    }

    /// Every known peer address regardless of liveness; the announcement
    /// loop greets them all so silent peers can come back
    pub fn all_peers(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|entry| entry.addr).collect()
    }

    /// Resolve an inbound connection's remote address to a known peer
    /// address. Outbound sockets carry an ephemeral source port, so an
    /// exact match is tried first and then a same-IP match when it is
    /// unambiguous among live peers.
    pub fn resolve_origin(&self, remote: SocketAddr) -> Option<SocketAddr> {
        if self.peers.contains_key(&remote) {
            return Some(remote);
        }

        let mut candidates = self
            .peers
            .iter()
            .filter(|entry| entry.is_alive() && entry.addr.ip() == remote.ip())
            .map(|entry| entry.addr);

        match (candidates.next(), candidates.next()) {
            (Some(addr), None) => Some(addr),
            _ => None,
        }
    }

    /// Mark expired every record whose silence exceeds the liveness
    /// timeout. Invoked periodically, not on every read.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut expired = 0;

        for mut entry in self.peers.iter_mut() {
            if entry.is_alive() && entry.is_stale(now, self.liveness_timeout) {
                entry.expire();
                expired += 1;
                debug!("Peer {} expired", entry.addr);
            }
        }

        expired
    }

    /// Check if an address is known
    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.peers.contains_key(&addr)
    }

    /// Total number of known peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are known
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
