use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::network::handlers::inbound::{handle_connection, InboundDispatch};

/// Bind the listening socket. Kept separate from the accept loop so the
/// caller can learn the bound address before wiring the rest of the node.
pub async fn bind_listener(bind_addr: SocketAddr) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening for connections on {}", listener.local_addr()?);
    Ok(listener)
}

/// Run the accept loop: one task per connection, bounded by a semaphore
/// so a connection surge cannot exhaust the process. The loop itself
/// never blocks on envelope processing.
pub fn spawn_accept_loop(
    listener: TcpListener,
    dispatch: Arc<dyn InboundDispatch>,
    max_inflight: usize,
) -> JoinHandle<()> {
    let semaphore = Arc::new(Semaphore::new(max_inflight));

    tokio::spawn(async move {
        loop {
            // Wait for a free slot before accepting
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);

                    let dispatch = dispatch.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, addr, dispatch).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::inbound::DispatchOutcome;
    use crate::network::types::envelope::Envelope;
    use async_trait::async_trait;
    use tokio::net::TcpStream;

    struct AckEverything;

    #[async_trait]
    impl InboundDispatch for AckEverything {
        async fn dispatch(&self, _origin: SocketAddr, _envelope: Envelope) -> DispatchOutcome {
            DispatchOutcome::Ack
        }
    }

    #[tokio::test]
    async fn test_listener_binds_and_accepts() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = spawn_accept_loop(listener, Arc::new(AckEverything), 4);

        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        handle.abort();
    }
}
