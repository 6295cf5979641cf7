//! bgpeer-session — the tokio side of peering: dialing, accepting, running
//! sessions, and the supervisor loop that ties them to the peer registry.

pub mod acceptor;
pub mod connection;
pub mod dialer;
pub mod error;
pub mod event;
pub mod listener;
pub mod status;
pub mod supervisor;
pub mod worker;

pub use connection::Connection;
pub use error::SupervisorError;
pub use event::{Event, SessionOutcome};
pub use status::{PeerStatus, StatusSnapshot};
pub use supervisor::{Control, Supervisor, SupervisorHandle};
