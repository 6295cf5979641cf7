//! Point-in-time view of the supervisor, published after every dispatch.

use std::net::{IpAddr, SocketAddr};

use serde::Serialize;

use bgpeer_core::{ConnectionTracker, PeerId};

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub listen_addr: Option<SocketAddr>,
    pub accept_outstanding: bool,
    pub pending_tasks: usize,
    pub dials_in_flight: usize,
    /// Live connections over all peers.
    pub connections: u32,
    pub established_active: u64,
    pub established_passive: u64,
    pub dial_failures: u64,
    pub sessions_ended: u64,
    pub stopped: bool,
    pub peers: Vec<PeerStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub addr: IpAddr,
    pub configured: bool,
    pub dialing: bool,
    pub connections: u32,
}

/// Running totals kept by the supervisor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub established_active: u64,
    pub established_passive: u64,
    pub dial_failures: u64,
    pub sessions_ended: u64,
}

impl StatusSnapshot {
    pub fn capture(
        tracker: &ConnectionTracker,
        counters: Counters,
        listen_addr: SocketAddr,
        pending_tasks: usize,
    ) -> Self {
        let mut ids: Vec<PeerId> = tracker.configured().copied().collect();
        ids.extend(tracker.registry().iter().map(|(p, _)| p));
        ids.sort();
        ids.dedup();

        let peers = ids
            .into_iter()
            .map(|p| PeerStatus {
                addr: p.ip(),
                configured: tracker.is_configured(&p),
                dialing: tracker.is_dialing(&p),
                connections: tracker.count(&p),
            })
            .collect();

        Self {
            listen_addr: Some(listen_addr),
            accept_outstanding: tracker.accept_outstanding(),
            pending_tasks,
            dials_in_flight: tracker.dials_in_flight(),
            connections: tracker.registry().total(),
            established_active: counters.established_active,
            established_passive: counters.established_passive,
            dial_failures: counters.dial_failures,
            sessions_ended: counters.sessions_ended,
            stopped: tracker.is_stopped(),
            peers,
        }
    }

    pub fn peer(&self, addr: IpAddr) -> Option<&PeerStatus> {
        let addr = PeerId::new(addr).ip();
        self.peers.iter().find(|p| p.addr == addr)
    }

    /// Live connections for `addr`, 0 if unknown.
    pub fn count(&self, addr: IpAddr) -> u32 {
        self.peer(addr).map(|p| p.connections).unwrap_or(0)
    }
}
