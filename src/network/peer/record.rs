use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Liveness status of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Recently seen, eligible for fan-out
    Alive,

    /// Not seen within the liveness timeout
    Expired,
}

/// A known peer
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The peer's listen address
    pub addr: SocketAddr,

    /// When the peer was last seen
    pub last_seen: Instant,

    /// Current liveness status
    pub status: PeerStatus,
}

impl PeerRecord {
    /// Create a new record for a freshly discovered peer
    pub fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            last_seen: now,
            status: PeerStatus::Alive,
        }
    }

    /// Refresh the record after fresh contact; revives an expired peer
    pub fn refresh(&mut self, now: Instant) {
        self.last_seen = now;
        self.status = PeerStatus::Alive;
    }

    /// Mark the record expired
    pub fn expire(&mut self) {
        self.status = PeerStatus::Expired;
    }

    /// Check if the peer is alive
    pub fn is_alive(&self) -> bool {
        self.status == PeerStatus::Alive
    }

    /// Check if the peer has been silent for longer than the timeout
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lifecycle() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let start = Instant::now();
        let mut record = PeerRecord::new(addr, start);

        assert!(record.is_alive());
        assert!(!record.is_stale(start, Duration::from_secs(300)));

        let later = start + Duration::from_secs(301);
        assert!(record.is_stale(later, Duration::from_secs(300)));

        record.expire();
        assert!(!record.is_alive());

        // Fresh contact revives the record
        record.refresh(later);
        assert!(record.is_alive());
        assert!(!record.is_stale(later, Duration::from_secs(300)));
    }
}
