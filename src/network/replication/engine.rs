//! Flood replication
//!
//! Every node applies the same one-hop rule: a plain message is recorded
//! and fanned out to all live peers except its origin as `[REPLICATED]`
//! copies; a replicated message is recorded and goes no further. Repeated
//! one-hop relays at each node carry a message across the connected mesh,
//! and the ledger's dedup check cuts every cycle.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info};
use thiserror::Error;

use crate::network::peer::registry::PeerRegistry;
use crate::network::sender::reliable::ReliableSender;
use crate::network::types::envelope::{Envelope, EnvelopeError};
use crate::storage::ledger::{LedgerError, MessageLedger, MessageRecord};

/// Error types for message acceptance
#[derive(Error, Debug)]
pub enum EngineError {
    /// Ledger error; the message was not accepted
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Invalid message fields
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Outcome of handling one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// First sighting: recorded, and forwarded to this many peers
    Recorded { forwarded: usize },

    /// Already in the ledger; propagation stops here
    Duplicate,
}

/// Accept/dedup/fan-out state machine
pub struct ReplicationEngine {
    /// Durable record of accepted messages
    ledger: Arc<MessageLedger>,

    /// Fan-out target source
    registry: Arc<PeerRegistry>,

    /// Delivery transport
    sender: Arc<ReliableSender>,
}

impl ReplicationEngine {
    /// Create a new replication engine
    pub fn new(
        ledger: Arc<MessageLedger>,
        registry: Arc<PeerRegistry>,
        sender: Arc<ReliableSender>,
    ) -> Self {
        Self {
            ledger,
            registry,
            sender,
        }
    }

    /// Handle one inbound chat message. `origin` is the address the
    /// message arrived from; it is excluded from fan-out.
    pub async fn handle_inbound(
        &self,
        origin: SocketAddr,
        replicated: bool,
        sender_name: &str,
        content: &str,
    ) -> Result<InboundOutcome, EngineError> {
        let record = match self.ledger.record_if_new(sender_name, content)? {
            Some(record) => record,
            None => {
                debug!("Duplicate message from {}, ignoring", sender_name);
                return Ok(InboundOutcome::Duplicate);
            }
        };

        info!(
            "Recorded message {} from {} via {}",
            record.id, record.sender, origin
        );

        // Only first-hop messages fan out; a replicated copy proves some
        // other node already did
        let forwarded = if replicated {
            0
        } else {
            let envelope = Envelope::replicated(sender_name, content)?;
            self.fan_out(envelope, Some(origin)).await
        };

        Ok(InboundOutcome::Recorded { forwarded })
    }

    /// Record a locally authored message and send it to every live peer.
    /// Returns `None` when the same message was already in the ledger;
    /// nothing is sent in that case.
    pub async fn publish_local(
        &self,
        sender_name: &str,
        content: &str,
    ) -> Result<Option<MessageRecord>, EngineError> {
        // Normalize exactly like the wire parser, so this node's ledger
        // key matches what receivers record; validation happens before
        // the ledger is touched
        let sender_name = sender_name.trim();
        let content = content.trim();
        let envelope = Envelope::chat(sender_name, content)?;

        let record = match self.ledger.record_if_new(sender_name, content)? {
            Some(record) => record,
            None => {
                debug!("Local message is already in the ledger, not sending");
                return Ok(None);
            }
        };

        let sent = self.fan_out(envelope, None).await;
        info!("Published message {} to {} peers", record.id, sent);

        Ok(Some(record))
    }

    async fn fan_out(&self, envelope: Envelope, excluding: Option<SocketAddr>) -> usize {
        let targets = self.registry.live_peers(excluding);

        if targets.is_empty() {
            debug!("No peers to fan out to");
            return 0;
        }

        debug!(
            "Fanning out {} envelope to {} peers",
            envelope.kind(),
            targets.len()
        );

        join_all(
            targets
                .iter()
                .map(|&addr| self.sender.dispatch(addr, envelope.clone())),
        )
        .await;

        targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::codec::frame::{EnvelopeReader, EnvelopeWriter};
    use crate::storage::kv_store::RocksDBStore;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn build_engine(dir: &std::path::Path, registry: Arc<PeerRegistry>) -> ReplicationEngine {
        let store = Arc::new(RocksDBStore::new(dir).unwrap());
        let ledger = Arc::new(MessageLedger::open(store).unwrap());
        let sender = Arc::new(ReliableSender::new(
            registry.clone(),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(1),
            None,
        ));
        ReplicationEngine::new(ledger, registry, sender)
    }

    /// An acking peer that remembers every envelope it received
    async fn spawn_recording_peer() -> (SocketAddr, Arc<Mutex<Vec<Envelope>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let sink = sink.clone();
                tokio::spawn(async move {
                    let (read_half, write_half) = stream.split();
                    let mut reader = EnvelopeReader::new(read_half);

                    if let Ok(Some(envelope)) = reader.read_envelope().await {
                        sink.lock().unwrap().push(envelope.clone());
                        let mut writer = EnvelopeWriter::new(write_half);
                        let _ = writer.write_envelope(&envelope.ack_for()).await;
                    }
                });
            }
        });

        (addr, received)
    }

    #[tokio::test]
    async fn test_plain_inbound_fans_out_excluding_origin() {
        let (origin_addr, origin_received) = spawn_recording_peer().await;
        let (other_addr, other_received) = spawn_recording_peer().await;

        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        registry.announce(origin_addr);
        registry.announce(other_addr);

        let dir = tempdir().unwrap();
        let engine = build_engine(dir.path(), registry);

        let outcome = engine
            .handle_inbound(origin_addr, false, "alice", "hello")
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Recorded { forwarded: 1 });

        // The forwarded copy carries the replicated tag and never goes
        // back to the origin
        let other = other_received.lock().unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0], Envelope::replicated("alice", "hello").unwrap());
        assert!(origin_received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replicated_inbound_is_not_forwarded() {
        let (peer_addr, peer_received) = spawn_recording_peer().await;

        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        registry.announce(peer_addr);

        let dir = tempdir().unwrap();
        let engine = build_engine(dir.path(), registry);

        let origin: SocketAddr = "127.0.0.1:49000".parse().unwrap();
        let outcome = engine
            .handle_inbound(origin, true, "alice", "hello")
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Recorded { forwarded: 0 });
        assert!(peer_received.lock().unwrap().is_empty());
        assert!(engine.ledger.exists("alice", "hello").unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_inbound_halts_propagation() {
        let (peer_addr, peer_received) = spawn_recording_peer().await;

        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        registry.announce(peer_addr);

        let dir = tempdir().unwrap();
        let engine = build_engine(dir.path(), registry);

        let origin: SocketAddr = "127.0.0.1:49000".parse().unwrap();
        engine
            .handle_inbound(origin, false, "alice", "hello")
            .await
            .unwrap();

        let second = engine
            .handle_inbound(origin, false, "alice", "hello")
            .await
            .unwrap();

        assert_eq!(second, InboundOutcome::Duplicate);
        assert_eq!(engine.ledger.list_since(0).unwrap().len(), 1);
        // Only the first sighting was forwarded
        assert_eq!(peer_received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_local_sends_plain_copies() {
        let (peer_addr, peer_received) = spawn_recording_peer().await;

        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        registry.announce(peer_addr);

        let dir = tempdir().unwrap();
        let engine = build_engine(dir.path(), registry);

        let record = engine.publish_local("alice", "hello").await.unwrap();
        assert!(record.is_some());

        // The origin sends untagged copies; receivers do the tagged hop
        let received = peer_received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], Envelope::chat("alice", "hello").unwrap());

        // Publishing the identical message again is a silent no-op
        drop(received);
        let again = engine.publish_local("alice", "hello").await.unwrap();
        assert!(again.is_none());
        assert_eq!(peer_received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_local_rejects_empty_content() {
        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        let dir = tempdir().unwrap();
        let engine = build_engine(dir.path(), registry);

        assert!(engine.publish_local("alice", "   ").await.is_err());
        assert_eq!(engine.ledger.list_since(0).unwrap().len(), 0);
    }
}
