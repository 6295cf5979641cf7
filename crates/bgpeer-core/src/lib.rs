//! bgpeer-core — configuration, peer bookkeeping, and scheduling decisions.
//! No I/O lives here; the session crate drives these types from its event loop.

pub mod config;
pub mod registry;
pub mod tracker;

pub use config::{BgpeerConfig, ConfigError, SupervisorConfig};
pub use registry::{PeerId, PeerRegistry, RegistryError};
pub use tracker::{ConnectionTracker, Followup, Origin};
