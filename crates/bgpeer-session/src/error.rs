//! Fatal errors. Anything that reaches the supervisor as one of these
//! stops the loop; retryable dial failures travel as events instead.

use std::io;
use std::net::SocketAddr;

use bgpeer_core::{Origin, PeerId, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("unusable address for peer {peer}: {reason}")]
    FatalAddress { peer: PeerId, reason: String },

    #[error("unclassified transport error with {peer}: {source}")]
    UnknownTransport {
        peer: PeerId,
        #[source]
        source: io::Error,
    },

    #[error("listening socket failed: {0}")]
    ListenerFailure(#[source] io::Error),

    #[error("registry invariant violated: {0}")]
    InvariantViolation(#[from] RegistryError),

    #[error(
        "{} connection {local} -> {remote} breaks the well-known port {port} rule",
        origin.as_str()
    )]
    ProtocolAssumptionViolated {
        origin: Origin,
        local: SocketAddr,
        remote: SocketAddr,
        port: u16,
    },

    #[error("task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
