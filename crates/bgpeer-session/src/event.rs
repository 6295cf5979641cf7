//! Results of supervised tasks.

use std::io;

use bgpeer_core::PeerId;

use crate::connection::Connection;

/// One event per finished dial, accept, or session.
#[derive(Debug)]
pub enum Event {
    NewActiveConnection(Connection),
    NewPassiveConnection(Connection),
    /// Dial timed out or was refused; the backoff wait has already passed.
    DialTimedOut { peer: PeerId, reason: String },
    /// The worker is done with the connection and hands it back for closing.
    SessionEnded {
        connection: Connection,
        outcome: SessionOutcome,
    },
}

impl Event {
    pub fn peer(&self) -> PeerId {
        match self {
            Event::NewActiveConnection(c) | Event::NewPassiveConnection(c) => c.peer(),
            Event::DialTimedOut { peer, .. } => *peer,
            Event::SessionEnded { connection, .. } => connection.peer(),
        }
    }
}

/// How a session finished. Both cases are handled the same way;
/// the error is kept for the log line.
#[derive(Debug)]
pub enum SessionOutcome {
    Closed,
    Failed(io::Error),
}

impl SessionOutcome {
    pub fn is_normal(&self) -> bool {
        matches!(self, SessionOutcome::Closed)
    }
}
