// Meshchat network module
//
// This module provides the peer-to-peer replication layer:
// - Peer discovery via gossip announcements and connect-scan probing
// - Flood replication of chat messages with content-addressed dedup
// - Reliable delivery with acknowledgements and a retry buffer

pub mod codec;
pub mod handlers;
pub mod peer;
pub mod replication;
pub mod sender;
pub mod service;
pub mod types;

pub use peer::registry::PeerRegistry;
pub use replication::engine::{InboundOutcome, ReplicationEngine};
pub use sender::reliable::{ReliableSender, SendOutcome};
pub use service::{Node, NodeError};
pub use types::envelope::Envelope;
