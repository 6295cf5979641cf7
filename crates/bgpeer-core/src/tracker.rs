//! Connection tracker — decides what to schedule after each event.
//!
//! The supervisor feeds every completed task into one of the `on_*` methods
//! and executes the returned follow-ups. All bookkeeping (connection counts,
//! configured peers, dials in flight, the single outstanding accept) lives
//! here, so the scheduling rules can be exercised without sockets.
//!
//! A dial is scheduled for a peer only when it is configured, holds no
//! connection in either direction, and has no dial already in flight.

use std::collections::{BTreeSet, HashSet};

use crate::registry::{PeerId, PeerRegistry, RegistryError};

/// Which side opened a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// We dialed out; the well-known port is on the remote side.
    Active,
    /// We accepted; the well-known port is on the local side.
    Passive,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Active => "active",
            Origin::Passive => "passive",
        }
    }
}

/// Work the supervisor must start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Dial(PeerId),
    Accept,
}

#[derive(Debug, Default)]
pub struct ConnectionTracker {
    registry: PeerRegistry,
    configured: BTreeSet<PeerId>,
    dialing: HashSet<PeerId>,
    accept_outstanding: bool,
    stopped: bool,
}

impl ConnectionTracker {
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            configured: peers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Initial work: one accept plus one dial per configured peer.
    pub fn start(&mut self) -> Vec<Followup> {
        let mut work = Vec::with_capacity(self.configured.len() + 1);
        work.extend(self.accept_if_idle());
        let peers: Vec<PeerId> = self.configured.iter().copied().collect();
        for peer in peers {
            work.extend(self.dial_if_needed(peer));
        }
        work
    }

    /// A dial or accept produced a connection.
    pub fn on_established(
        &mut self,
        peer: PeerId,
        origin: Origin,
    ) -> Result<Vec<Followup>, RegistryError> {
        let mut work = Vec::new();
        match origin {
            Origin::Active => {
                if !self.dialing.remove(&peer) {
                    return Err(RegistryError::NoDialInFlight(peer));
                }
            }
            Origin::Passive => {
                if !self.accept_outstanding {
                    return Err(RegistryError::NoAcceptOutstanding);
                }
                self.accept_outstanding = false;
                work.extend(self.accept_if_idle());
            }
        }
        self.registry.increment(peer);
        Ok(work)
    }

    /// A dial timed out or was refused, after its backoff.
    pub fn on_dial_timed_out(&mut self, peer: PeerId) -> Result<Vec<Followup>, RegistryError> {
        if !self.dialing.remove(&peer) {
            return Err(RegistryError::NoDialInFlight(peer));
        }
        Ok(self.dial_if_needed(peer).into_iter().collect())
    }

    /// A session closed, normally or not.
    pub fn on_session_ended(&mut self, peer: PeerId) -> Result<Vec<Followup>, RegistryError> {
        self.registry.decrement(peer)?;
        Ok(self.dial_if_needed(peer).into_iter().collect())
    }

    /// Start managing a peer. Returns a dial if one is needed now.
    pub fn add_peer(&mut self, peer: PeerId) -> Option<Followup> {
        self.configured.insert(peer);
        self.dial_if_needed(peer)
    }

    /// Stop managing a peer. Live connections and in-flight dials run out
    /// on their own; nothing new is scheduled for it.
    pub fn remove_peer(&mut self, peer: &PeerId) -> bool {
        self.configured.remove(peer)
    }

    /// Refuse all further scheduling.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn count(&self, peer: &PeerId) -> u32 {
        self.registry.count(peer)
    }

    pub fn is_configured(&self, peer: &PeerId) -> bool {
        self.configured.contains(peer)
    }

    pub fn is_dialing(&self, peer: &PeerId) -> bool {
        self.dialing.contains(peer)
    }

    pub fn dials_in_flight(&self) -> usize {
        self.dialing.len()
    }

    pub fn accept_outstanding(&self) -> bool {
        self.accept_outstanding
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn configured(&self) -> impl Iterator<Item = &PeerId> {
        self.configured.iter()
    }

    fn dial_if_needed(&mut self, peer: PeerId) -> Option<Followup> {
        if self.stopped
            || !self.configured.contains(&peer)
            || self.registry.count(&peer) > 0
            || self.dialing.contains(&peer)
        {
            return None;
        }
        self.dialing.insert(peer);
        Some(Followup::Dial(peer))
    }

    fn accept_if_idle(&mut self) -> Option<Followup> {
        if self.stopped || self.accept_outstanding {
            return None;
        }
        self.accept_outstanding = true;
        Some(Followup::Accept)
    }
}
