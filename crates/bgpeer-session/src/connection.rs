//! An established TCP connection to a peer.
//!
//! Created by the dialer or the acceptor once the port rule holds, moved
//! into a session worker, handed back in `SessionEnded`, and closed by the
//! supervisor.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::TcpStream;

use bgpeer_core::{Origin, PeerId};

use crate::error::SupervisorError;

#[derive(Debug)]
pub struct Connection {
    pub(crate) stream: TcpStream,
    peer: PeerId,
    origin: Origin,
    local: SocketAddr,
    remote: SocketAddr,
    established_at: Instant,
}

impl Connection {
    /// Wrap a stream after checking the port rule for its origin.
    pub fn establish(
        stream: TcpStream,
        origin: Origin,
        local: SocketAddr,
        remote: SocketAddr,
        port: u16,
    ) -> Result<Self, SupervisorError> {
        check_ports(origin, local, remote, port)?;
        Ok(Self {
            stream,
            peer: PeerId::from_remote(remote),
            origin,
            local,
            remote,
            established_at: Instant::now(),
        })
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Re-check the port rule, e.g. before the supervisor counts it.
    pub fn verify(&self, port: u16) -> Result<(), SupervisorError> {
        check_ports(self.origin, self.local, self.remote, port)
    }

    /// Release the socket.
    pub fn close(self) {
        tracing::debug!(
            peer = %self.peer,
            origin = self.origin.as_str(),
            local = %self.local,
            remote = %self.remote,
            lifetime_secs = self.established_at.elapsed().as_secs(),
            "connection closed"
        );
    }
}

/// Exactly one end uses the well-known port: the remote end for a dial,
/// the local end for an accept.
pub fn check_ports(
    origin: Origin,
    local: SocketAddr,
    remote: SocketAddr,
    port: u16,
) -> Result<(), SupervisorError> {
    let ok = match origin {
        Origin::Active => remote.port() == port && local.port() != port,
        Origin::Passive => local.port() == port && remote.port() != port,
    };
    if ok {
        Ok(())
    } else {
        Err(SupervisorError::ProtocolAssumptionViolated {
            origin,
            local,
            remote,
            port,
        })
    }
}
