//! Node assembly
//!
//! `Node::start` binds the listener, wires the ledger, registry, sender
//! and engine together, and spawns the background tasks: the accept
//! loop, the announcement loop, the reciprocal-announcement worker, the
//! retry sweep, the peer-expiry sweep, and the optional probe refresh.

pub mod dialer;
pub mod listener;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::NetworkConfig;
use crate::network::handlers::inbound::{DispatchOutcome, InboundDispatch};
use crate::network::peer::discovery::{Discovery, Prober};
use crate::network::peer::registry::PeerRegistry;
use crate::network::replication::engine::{EngineError, ReplicationEngine};
use crate::network::sender::reliable::ReliableSender;
use crate::network::types::envelope::Envelope;
use crate::storage::ledger::{MessageLedger, MessageRecord};

/// Error types for node startup
#[derive(Error, Debug)]
pub enum NodeError {
    /// IO error, typically a failed bind
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable configured address
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
}

/// A running meshchat node
pub struct Node {
    /// Sender identity for locally authored messages
    node_name: String,

    /// Actual bound listen address
    local_addr: SocketAddr,

    /// Message ledger
    ledger: Arc<MessageLedger>,

    /// Peer registry
    registry: Arc<PeerRegistry>,

    /// Reliable sender
    sender: Arc<ReliableSender>,

    /// Replication engine
    engine: Arc<ReplicationEngine>,

    /// Background task handles
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Start a node: bind the listener, assemble the subsystems, seed
    /// the static peer list, and spawn the background tasks
    pub async fn start(
        node_name: String,
        config: NetworkConfig,
        ledger: Arc<MessageLedger>,
    ) -> Result<Arc<Self>, NodeError> {
        let listener = listener::bind_listener(config.bind_addr()?).await?;
        let local_addr = listener.local_addr()?;

        // The announced address carries the actual bound port unless an
        // explicit advertise address is configured
        let advertised = match &config.advertise_addr {
            Some(addr) => addr.parse()?,
            None => SocketAddr::new(config.listen_addr.parse()?, local_addr.port()),
        };

        let (gossip_tx, gossip_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(
            PeerRegistry::new(config.liveness_timeout_duration())
                .with_local_addr(advertised)
                .with_gossip_channel(gossip_tx),
        );

        // Outbound connections dial from the listen interface so peers
        // can attribute them to this node
        let sender = Arc::new(
            ReliableSender::new(
                registry.clone(),
                config.connection_timeout_duration(),
                config.ack_timeout_duration(),
                config.retry_interval_duration(),
                config.max_send_attempts,
            )
            .with_local_ip(config.listen_addr.parse()?),
        );

        let engine = Arc::new(ReplicationEngine::new(
            ledger.clone(),
            registry.clone(),
            sender.clone(),
        ));

        let node = Arc::new(Self {
            node_name,
            local_addr,
            ledger,
            registry: registry.clone(),
            sender: sender.clone(),
            engine,
            tasks: Mutex::new(Vec::new()),
        });

        // Seeding the static peers emits them on the gossip channel, so
        // the reciprocal worker greets them as soon as it starts
        for addr in config.static_peer_addrs() {
            registry.announce(addr);
        }

        let mut tasks = Vec::new();

        tasks.push(listener::spawn_accept_loop(
            listener,
            node.clone() as Arc<dyn InboundDispatch>,
            config.max_inbound,
        ));

        let discovery = Arc::new(Discovery::new(
            registry.clone(),
            sender.clone(),
            advertised,
            config.announce_interval_duration(),
        ));
        tasks.extend(discovery.start(gossip_rx));

        tasks.push(sender.clone().spawn_sweeper());

        tasks.push({
            let registry = registry.clone();
            let sweep_interval = config.sweep_interval_duration();
            tokio::spawn(async move {
                let mut ticker = interval(sweep_interval);
                loop {
                    ticker.tick().await;
                    let expired = registry.sweep_expired();
                    if expired > 0 {
                        debug!("Expired {} silent peers", expired);
                    }
                }
            })
        });

        if let Some(probe_config) = &config.probe {
            let prober = Arc::new(Prober::new(
                registry.clone(),
                probe_config.candidate_addrs(),
                probe_config.refresh_interval_duration(),
                config.connection_timeout_duration(),
            ));
            tasks.push(prober.start());
        }

        *node.tasks.lock().unwrap() = tasks;

        info!("Node {} up at {}", node.node_name, advertised);
        Ok(node)
    }

    /// Record a locally authored message and send it to every live peer.
    /// Returns `None` when the identical message is already in the ledger.
    pub async fn publish(&self, content: &str) -> Result<Option<MessageRecord>, EngineError> {
        self.engine.publish_local(&self.node_name, content).await
    }

    /// The actual bound listen address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The node's message ledger
    pub fn ledger(&self) -> &Arc<MessageLedger> {
        &self.ledger
    }

    /// The node's peer registry
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Number of deliveries currently awaiting retry
    pub fn pending_deliveries(&self) -> usize {
        self.sender.pending_count()
    }

    /// Abort every background task
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl InboundDispatch for Node {
    async fn dispatch(&self, remote: SocketAddr, envelope: Envelope) -> DispatchOutcome {
        match envelope {
            Envelope::Hello { addr } => {
                self.registry.announce(addr);
                DispatchOutcome::Ack
            }
            Envelope::Chat {
                replicated,
                sender,
                content,
            } => {
                // Outbound sockets carry ephemeral ports; map the remote
                // back to a known peer address where possible
                let origin = self.registry.resolve_origin(remote).unwrap_or(remote);

                match self
                    .engine
                    .handle_inbound(origin, replicated, &sender, &content)
                    .await
                {
                    Ok(_) => DispatchOutcome::Ack,
                    Err(e) => {
                        // No ack: the sender keeps the message buffered
                        // and retries
                        error!("Failed to accept message from {}: {}", origin, e);
                        DispatchOutcome::NoReply
                    }
                }
            }
            Envelope::Ack { .. } => {
                debug!("Unsolicited ack from {}", remote);
                DispatchOutcome::NoReply
            }
        }
    }
}
