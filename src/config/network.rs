use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address
    pub listen_addr: String,

    /// Listen port
    pub listen_port: u16,

    /// Address announced to peers, if different from the listen address
    pub advertise_addr: Option<String>,

    /// Static peer list in host:port form
    pub static_peers: Vec<String>,

    /// Active probing over a flat address range, used when no
    /// announcement channel exists
    pub probe: Option<ProbeConfig>,

    /// Seconds without contact before a peer record expires
    pub liveness_timeout: u64,

    /// Seconds between discovery announcements
    pub announce_interval: u64,

    /// Seconds between retry-buffer sweeps
    pub retry_interval: u64,

    /// Seconds to wait for an acknowledgement
    pub ack_timeout: u64,

    /// Seconds to wait for an outbound connection
    pub connection_timeout: u64,

    /// Seconds between peer-expiry sweeps
    pub sweep_interval: u64,

    /// Maximum delivery attempts per pending message; unset retries forever
    pub max_send_attempts: Option<u32>,

    /// Maximum number of in-flight inbound connections
    pub max_inbound: usize,
}

/// Configuration for connect-scan peer discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Host to scan
    pub host: String,

    /// First port in the scanned range, inclusive
    pub port_start: u16,

    /// Last port in the scanned range, inclusive
    pub port_end: u16,

    /// Seconds between probe refreshes
    pub refresh_interval: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 5000,
            advertise_addr: None,
            static_peers: vec![],
            probe: None,
            liveness_timeout: 300,
            announce_interval: 10,
            retry_interval: 5,
            ack_timeout: 5,
            connection_timeout: 3,
            sweep_interval: 30,
            max_send_attempts: None,
            max_inbound: 64,
        }
    }
}

impl NetworkConfig {
    /// Create a new network configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address and port
    pub fn with_listen(mut self, addr: &str, port: u16) -> Self {
        self.listen_addr = addr.to_string();
        self.listen_port = port;
        self
    }

    /// Set the static peer list
    pub fn with_static_peers(mut self, peers: Vec<String>) -> Self {
        self.static_peers = peers;
        self
    }

    /// Set the retry-sweep interval
    pub fn with_retry_interval(mut self, seconds: u64) -> Self {
        self.retry_interval = seconds;
        self
    }

    /// Set the announcement interval
    pub fn with_announce_interval(mut self, seconds: u64) -> Self {
        self.announce_interval = seconds;
        self
    }

    /// Set the delivery attempts ceiling
    pub fn with_max_send_attempts(mut self, attempts: u32) -> Self {
        self.max_send_attempts = Some(attempts);
        self
    }

    /// The socket address to bind the listener to
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.listen_addr, self.listen_port).parse()
    }

    /// The address announced to peers. Falls back to the listen address
    /// when no advertise address is configured.
    pub fn advertised_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        match &self.advertise_addr {
            Some(addr) => addr.parse(),
            None => self.bind_addr(),
        }
    }

    /// Parsed static peer addresses; invalid entries are skipped
    pub fn static_peer_addrs(&self) -> Vec<SocketAddr> {
        self.static_peers
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect()
    }

    /// Get the liveness timeout as a Duration
    pub fn liveness_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout)
    }

    /// Get the announcement interval as a Duration
    pub fn announce_interval_duration(&self) -> Duration {
        Duration::from_secs(self.announce_interval)
    }

    /// Get the retry-sweep interval as a Duration
    pub fn retry_interval_duration(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }

    /// Get the acknowledgement timeout as a Duration
    pub fn ack_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.ack_timeout)
    }

    /// Get the connection timeout as a Duration
    pub fn connection_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Get the peer-sweep interval as a Duration
    pub fn sweep_interval_duration(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

impl ProbeConfig {
    /// Candidate addresses in the configured range; invalid hosts yield
    /// an empty set
    pub fn candidate_addrs(&self) -> Vec<SocketAddr> {
        (self.port_start..=self.port_end)
            .filter_map(|port| format!("{}:{}", self.host, port).parse().ok())
            .collect()
    }

    /// Get the probe refresh interval as a Duration
    pub fn refresh_interval_duration(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}
