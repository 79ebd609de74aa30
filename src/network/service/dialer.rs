use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use log::debug;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

/// Connect to a peer with timeout
pub async fn connect_to_peer(
    addr: SocketAddr,
    connect_timeout: Duration,
) -> Result<TcpStream, std::io::Error> {
    debug!("Connecting to peer {}", addr);

    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            debug!("Failed to connect to peer {}: {}", addr, e);
            Err(e)
        }
        Err(_) => {
            debug!("Connection to peer {} timed out", addr);
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Connection timed out",
            ))
        }
    }
}

/// Connect to a peer with timeout, dialing from the given local IP so the
/// remote end can attribute the connection to this node's interface
pub async fn connect_from(
    local_ip: IpAddr,
    addr: SocketAddr,
    connect_timeout: Duration,
) -> Result<TcpStream, std::io::Error> {
    debug!("Connecting to peer {} from {}", addr, local_ip);

    let socket = match local_ip {
        IpAddr::V4(_) => TcpSocket::new_v4()?,
        IpAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.bind(SocketAddr::new(local_ip, 0))?;

    match timeout(connect_timeout, socket.connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            debug!("Failed to connect to peer {}: {}", addr, e);
            Err(e)
        }
        Err(_) => {
            debug!("Connection to peer {} timed out", addr);
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Connection timed out",
            ))
        }
    }
}

/// Probe multiple candidate addresses in parallel, returning those that
/// accepted a connection within the timeout
pub async fn probe_peers(addrs: &[SocketAddr], connect_timeout: Duration) -> Vec<SocketAddr> {
    let attempts = addrs.iter().map(|&addr| async move {
        connect_to_peer(addr, connect_timeout).await.ok().map(|_| addr)
    });

    join_all(attempts).await.into_iter().flatten().collect()
}
