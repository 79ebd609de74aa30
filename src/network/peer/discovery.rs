//! Peer discovery
//!
//! Two strategies feed the registry. Gossip: a node periodically
//! announces its own address to every peer it knows, and answers a new
//! peer's announcement with a reciprocal one so the mesh assembles
//! without a central directory. Probing: when no announcement channel
//! exists, a bounded connect-scan over a flat address range finds
//! listening peers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::network::peer::registry::PeerRegistry;
use crate::network::sender::reliable::{ReliableSender, SendOutcome};
use crate::network::service::dialer;
use crate::network::types::envelope::Envelope;

/// Gossip announcement loop and reciprocal-announcement worker
pub struct Discovery {
    /// Peer registry being populated
    registry: Arc<PeerRegistry>,

    /// Transport for announcements
    sender: Arc<ReliableSender>,

    /// The address this node announces
    advertised: SocketAddr,

    /// Interval between announcement rounds
    announce_interval: Duration,
}

impl Discovery {
    /// Create a new discovery service
    pub fn new(
        registry: Arc<PeerRegistry>,
        sender: Arc<ReliableSender>,
        advertised: SocketAddr,
        announce_interval: Duration,
    ) -> Self {
        Self {
            registry,
            sender,
            advertised,
            announce_interval,
        }
    }

    /// Spawn the announcement loop and the reciprocal-announcement
    /// worker. The first announcement round runs immediately so a
    /// starting node greets its static peers right away.
    pub fn start(
        self: Arc<Self>,
        mut gossip_rx: mpsc::UnboundedReceiver<SocketAddr>,
    ) -> Vec<JoinHandle<()>> {
        let announcer = {
            let discovery = self.clone();
            tokio::spawn(async move {
                let mut ticker = interval(discovery.announce_interval);

                loop {
                    ticker.tick().await;
                    discovery.announce_round().await;
                }
            })
        };

        let reciprocal = tokio::spawn(async move {
            while let Some(addr) = gossip_rx.recv().await {
                debug!("Sending reciprocal announcement to {}", addr);
                self.send_hello(addr).await;
            }
        });

        vec![announcer, reciprocal]
    }

    /// Announce this node to every known peer, expired ones included so
    /// a silent peer can come back
    async fn announce_round(&self) {
        for addr in self.registry.all_peers() {
            self.send_hello(addr).await;
        }
    }

    async fn send_hello(&self, addr: SocketAddr) {
        let envelope = Envelope::hello(self.advertised);

        // Announcements are best-effort; the periodic round repeats them
        if self.sender.send(addr, &envelope).await == SendOutcome::Failed {
            debug!("Announcement to {} failed", addr);
        }
    }
}

/// Connect-scan discovery over a flat address range, cached so repeated
/// calls within the refresh interval cost nothing
pub struct Prober {
    /// Registry fed with accepting addresses
    registry: Arc<PeerRegistry>,

    /// Candidate addresses to scan
    candidates: Vec<SocketAddr>,

    /// Cache lifetime between scans
    refresh_interval: Duration,

    /// Timeout per connection attempt
    connect_timeout: Duration,

    /// Last scan instant and result
    cache: Mutex<Option<(Instant, Vec<SocketAddr>)>>,
}

impl Prober {
    /// Create a new prober over the given candidate addresses
    pub fn new(
        registry: Arc<PeerRegistry>,
        candidates: Vec<SocketAddr>,
        refresh_interval: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            candidates,
            refresh_interval,
            connect_timeout,
            cache: Mutex::new(None),
        }
    }

    /// Addresses in the range that currently accept connections. Scans
    /// at most once per refresh interval; accepting peers are announced
    /// into the registry.
    pub async fn probe(&self) -> Vec<SocketAddr> {
        if let Some((scanned_at, cached)) = self.cache.lock().unwrap().as_ref() {
            if scanned_at.elapsed() < self.refresh_interval {
                return cached.clone();
            }
        }

        debug!("Probing {} candidate addresses", self.candidates.len());
        let accepted = dialer::probe_peers(&self.candidates, self.connect_timeout).await;

        for &addr in &accepted {
            if self.registry.announce(addr) {
                info!("Probe discovered peer {}", addr);
            }
        }

        *self.cache.lock().unwrap() = Some((Instant::now(), accepted.clone()));
        accepted
    }

    /// Spawn the periodic probe refresh
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.refresh_interval);

            loop {
                ticker.tick().await;
                self.probe().await;
            }
        })
    }
}
