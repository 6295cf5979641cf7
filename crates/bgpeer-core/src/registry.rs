//! Peer registry — per-peer count of live connections.
//!
//! The registry is the single answer to "does this peer need a dial?".
//! It is owned by the supervisor and only mutated from its dispatch step,
//! so it is a plain map rather than a shared concurrent one.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A peer, identified by its IP address.
///
/// IPv4-mapped IPv6 addresses are folded to IPv4 so a dual-stack accept
/// matches the configured IPv4 peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(IpAddr);

impl PeerId {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip.to_canonical())
    }

    /// Peer identity of the remote end of a socket.
    pub fn from_remote(addr: SocketAddr) -> Self {
        Self::new(addr.ip())
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl From<IpAddr> for PeerId {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bookkeeping invariant violations. Each one is a logic defect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("connection count for {0} would go negative")]
    NegativeCount(PeerId),
    #[error("inbound connection with no accept outstanding")]
    NoAcceptOutstanding,
    #[error("dial result for {0} with no dial in flight")]
    NoDialInFlight(PeerId),
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    counts: HashMap<PeerId, u32>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly established connection. Returns the new count.
    pub fn increment(&mut self, peer: PeerId) -> u32 {
        let count = self.counts.entry(peer).or_insert(0);
        *count += 1;
        *count
    }

    /// Record a closed connection. Returns the new count; a peer whose
    /// count reaches zero is forgotten.
    pub fn decrement(&mut self, peer: PeerId) -> Result<u32, RegistryError> {
        let remaining = match self.counts.get_mut(&peer) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            _ => return Err(RegistryError::NegativeCount(peer)),
        };
        if remaining == 0 {
            self.counts.remove(&peer);
        }
        Ok(remaining)
    }

    pub fn count(&self, peer: &PeerId) -> u32 {
        self.counts.get(peer).copied().unwrap_or(0)
    }

    /// Sum over all peers.
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Every peer with at least one live connection.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, u32)> + '_ {
        self.counts.iter().map(|(p, c)| (*p, *c))
    }
}
