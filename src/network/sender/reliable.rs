//! Reliable delivery with acknowledgement and retry
//!
//! A send opens one connection, writes one envelope, half-closes, and
//! waits for the echo-acknowledgement. Failed deliveries land in a
//! pending buffer that a fixed-interval sweep re-attempts until the
//! peer acknowledges or a configured attempts ceiling is hit.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::network::codec::frame::{CodecError, EnvelopeReader, EnvelopeWriter};
use crate::network::peer::registry::PeerRegistry;
use crate::network::service::dialer;
use crate::network::types::envelope::Envelope;

/// Result of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The peer acknowledged the envelope
    Acked,

    /// Connection, write, or acknowledgement failed
    Failed,
}

/// Error types for a delivery attempt; all of them are recoverable and
/// only drive retry
#[derive(Error, Debug)]
pub enum SendError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No acknowledgement within the timeout
    #[error("Acknowledgement timed out")]
    AckTimeout,

    /// The peer closed without acknowledging
    #[error("Connection closed before acknowledgement")]
    ConnectionClosed,

    /// The peer replied with something other than the matching ack
    #[error("Unexpected {0} reply")]
    UnexpectedReply(&'static str),
}

/// A delivery waiting for retry
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    /// Destination peer
    pub target: SocketAddr,

    /// The envelope to deliver
    pub envelope: Envelope,

    /// Delivery attempts so far
    pub attempts: u32,

    /// Earliest instant of the next attempt
    pub next_retry_at: Instant,
}

/// Sender with acknowledgement matching and a retry buffer
pub struct ReliableSender {
    /// Peer registry, refreshed on every successful send
    registry: Arc<PeerRegistry>,

    /// Deliveries awaiting retry, keyed by target and wire line so a
    /// re-enqueue can never duplicate an entry
    pending: Mutex<HashMap<(SocketAddr, String), PendingDelivery>>,

    /// Local IP to dial from, when configured
    local_ip: Option<IpAddr>,

    /// Timeout for the connection attempt
    connect_timeout: Duration,

    /// Timeout for the acknowledgement
    ack_timeout: Duration,

    /// Interval between retry sweeps
    retry_interval: Duration,

    /// Attempts ceiling; `None` retries forever
    max_attempts: Option<u32>,
}

impl ReliableSender {
    /// Create a new reliable sender
    pub fn new(
        registry: Arc<PeerRegistry>,
        connect_timeout: Duration,
        ack_timeout: Duration,
        retry_interval: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
            local_ip: None,
            connect_timeout,
            ack_timeout,
            retry_interval,
            max_attempts,
        }
    }

    /// Dial outbound connections from the given local IP
    pub fn with_local_ip(mut self, ip: IpAddr) -> Self {
        self.local_ip = Some(ip);
        self
    }

    /// Attempt one delivery: connect, write, half-close, await the
    /// echo-acknowledgement
    pub async fn send(&self, addr: SocketAddr, envelope: &Envelope) -> SendOutcome {
        match self.try_send(addr, envelope).await {
            Ok(()) => {
                debug!("Delivered {} envelope to {}", envelope.kind(), addr);
                self.registry.mark_seen(addr);
                SendOutcome::Acked
            }
            Err(e) => {
                debug!("Delivery of {} envelope to {} failed: {}", envelope.kind(), addr, e);
                SendOutcome::Failed
            }
        }
    }

    /// Send, and on failure park the envelope in the retry buffer
    pub async fn dispatch(&self, addr: SocketAddr, envelope: Envelope) -> SendOutcome {
        let outcome = self.send(addr, &envelope).await;

        if outcome == SendOutcome::Failed {
            self.enqueue(addr, envelope);
        }

        outcome
    }

    /// Re-attempt every due pending delivery. Returns how many were
    /// delivered and removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();

        let due: Vec<((SocketAddr, String), Envelope)> = {
            let pending = self.pending.lock().unwrap();
            pending
                .iter()
                .filter(|(_, delivery)| delivery.next_retry_at <= now)
                .map(|(key, delivery)| (key.clone(), delivery.envelope.clone()))
                .collect()
        };

        let mut delivered = 0;

        for (key, envelope) in due {
            match self.send(key.0, &envelope).await {
                SendOutcome::Acked => {
                    self.pending.lock().unwrap().remove(&key);
                    delivered += 1;
                }
                SendOutcome::Failed => {
                    let mut pending = self.pending.lock().unwrap();
                    if let Some(delivery) = pending.get_mut(&key) {
                        delivery.attempts += 1;
                        delivery.next_retry_at = Instant::now() + self.retry_interval;

                        if let Some(ceiling) = self.max_attempts {
                            if delivery.attempts >= ceiling {
                                warn!(
                                    "Dropping delivery to {} after {} attempts",
                                    key.0, delivery.attempts
                                );
                                pending.remove(&key);
                            }
                        }
                    }
                }
            }
        }

        if delivered > 0 {
            info!("Retry sweep delivered {} pending envelopes", delivered);
        }

        delivered
    }

    /// Number of deliveries currently awaiting retry
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Spawn the fixed-interval retry sweep
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.retry_interval);

            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    fn enqueue(&self, addr: SocketAddr, envelope: Envelope) {
        let key = (addr, envelope.encode());
        let mut pending = self.pending.lock().unwrap();

        // A delivery already in the buffer keeps its attempt count
        pending.entry(key).or_insert_with(|| {
            debug!("Queued {} envelope for retry to {}", envelope.kind(), addr);
            PendingDelivery {
                target: addr,
                envelope,
                attempts: 1,
                next_retry_at: Instant::now() + self.retry_interval,
            }
        });
    }

    async fn try_send(&self, addr: SocketAddr, envelope: &Envelope) -> Result<(), SendError> {
        let mut stream = match self.local_ip {
            Some(ip) => dialer::connect_from(ip, addr, self.connect_timeout).await?,
            None => dialer::connect_to_peer(addr, self.connect_timeout).await?,
        };

        let (read_half, write_half) = stream.split();

        let mut writer = EnvelopeWriter::new(write_half);
        writer.write_envelope(envelope).await?;
        // Half-close so the peer sees the end of the envelope
        writer.shutdown().await?;

        let mut reader = EnvelopeReader::new(read_half);
        let reply = timeout(self.ack_timeout, reader.read_envelope())
            .await
            .map_err(|_| SendError::AckTimeout)??;

        match reply {
            Some(Envelope::Ack { payload }) if payload == envelope.encode() => Ok(()),
            Some(Envelope::Ack { .. }) => Err(SendError::UnexpectedReply("mismatched ack")),
            Some(other) => Err(SendError::UnexpectedReply(other.kind())),
            None => Err(SendError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn test_sender(max_attempts: Option<u32>) -> ReliableSender {
        let registry = Arc::new(PeerRegistry::new(Duration::from_secs(300)));
        ReliableSender::new(
            registry,
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_millis(50),
            max_attempts,
        )
    }

    /// A peer that acknowledges every envelope it receives
    async fn spawn_ack_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                tokio::spawn(async move {
                    let (read_half, write_half) = stream.split();
                    let mut reader = EnvelopeReader::new(read_half);

                    if let Ok(Some(envelope)) = reader.read_envelope().await {
                        let mut writer = EnvelopeWriter::new(write_half);
                        let _ = writer.write_envelope(&envelope.ack_for()).await;
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_send_acked() {
        let addr = spawn_ack_server().await;
        let sender = test_sender(None);

        let envelope = Envelope::chat("alice", "hello").unwrap();
        let outcome = sender.send(addr, &envelope).await;

        assert_eq!(outcome, SendOutcome::Acked);
        assert_eq!(sender.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_enqueues_once() {
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let sender = test_sender(None);

        let envelope = Envelope::chat("alice", "hello").unwrap();

        assert_eq!(sender.dispatch(dead, envelope.clone()).await, SendOutcome::Failed);
        assert_eq!(sender.pending_count(), 1);

        // Re-dispatching the same envelope must not grow the buffer
        assert_eq!(sender.dispatch(dead, envelope).await, SendOutcome::Failed);
        assert_eq!(sender.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_delivers_and_clears() {
        let sender = test_sender(None);
        let envelope = Envelope::chat("alice", "hello").unwrap();

        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();
        sender.dispatch(dead, envelope.clone()).await;
        assert_eq!(sender.pending_count(), 1);

        // A failing sweep keeps the entry
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sender.sweep().await, 0);
        assert_eq!(sender.pending_count(), 1);

        // Re-target the delivery at a live peer and sweep again
        let addr = spawn_ack_server().await;
        {
            let mut pending = sender.pending.lock().unwrap();
            let delivery = pending.remove(&(dead, envelope.encode())).unwrap();
            pending.insert(
                (addr, envelope.encode()),
                PendingDelivery {
                    target: addr,
                    next_retry_at: Instant::now(),
                    ..delivery
                },
            );
        }

        assert_eq!(sender.sweep().await, 1);
        assert_eq!(sender.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_attempts_ceiling_drops_delivery() {
        let sender = test_sender(Some(2));
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let envelope = Envelope::chat("alice", "hello").unwrap();
        sender.dispatch(dead, envelope).await;
        assert_eq!(sender.pending_count(), 1);

        // Second failed attempt hits the ceiling
        tokio::time::sleep(Duration::from_millis(60)).await;
        sender.sweep().await;
        assert_eq!(sender.pending_count(), 0);
    }
}
