use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::network::codec::frame::{EnvelopeReader, EnvelopeWriter};
use crate::network::types::envelope::Envelope;

/// A slow or stalled peer cannot pin a connection task past this
const CONNECTION_DEADLINE: Duration = Duration::from_secs(30);

/// What the listener should do after an envelope was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reply with the echo-acknowledgement
    Ack,

    /// Close without replying
    NoReply,
}

/// Dispatch seam between the transport listener and the node: one call
/// per classified inbound envelope
#[async_trait]
pub trait InboundDispatch: Send + Sync {
    /// Handle an envelope received from `origin`
    async fn dispatch(&self, origin: SocketAddr, envelope: Envelope) -> DispatchOutcome;
}

/// Handle one accepted connection: read its single envelope, dispatch
/// it, and acknowledge. Every failure is contained to this connection.
pub async fn handle_connection(
    mut stream: TcpStream,
    origin: SocketAddr,
    dispatch: Arc<dyn InboundDispatch>,
) {
    let (read_half, write_half) = stream.split();

    let mut reader = EnvelopeReader::new(read_half);
    let envelope = match timeout(CONNECTION_DEADLINE, reader.read_envelope()).await {
        Ok(Ok(Some(envelope))) => envelope,
        Ok(Ok(None)) => {
            debug!("Peer {} closed without sending an envelope", origin);
            return;
        }
        Ok(Err(e)) => {
            debug!("Dropping malformed envelope from {}: {}", origin, e);
            return;
        }
        Err(_) => {
            debug!("Peer {} stalled, closing connection", origin);
            return;
        }
    };

    debug!("Received {} envelope from {}", envelope.kind(), origin);
    let ack = envelope.ack_for();

    match dispatch.dispatch(origin, envelope).await {
        DispatchOutcome::Ack => {
            let mut writer = EnvelopeWriter::new(write_half);
            let reply = timeout(CONNECTION_DEADLINE, writer.write_envelope(&ack)).await;

            match reply {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Failed to acknowledge {}: {}", origin, e),
                Err(_) => debug!("Acknowledgement to {} stalled", origin),
            }
        }
        DispatchOutcome::NoReply => {}
    }
}
