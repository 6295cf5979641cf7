//! Passive acceptor — waits for one inbound connection.
//!
//! The supervisor keeps exactly one of these outstanding and only starts
//! the next after it has consumed this one's event.

use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;

use bgpeer_core::Origin;

use crate::connection::Connection;
use crate::error::SupervisorError;
use crate::event::Event;

pub async fn accept_one(listener: Arc<TcpListener>, port: u16) -> Result<Event, SupervisorError> {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(r) => r,
            // The remote end gave up before we got to it; the listener is fine.
            Err(e) if is_aborted_handshake(&e) => {
                tracing::debug!(error = %e, "inbound connection dropped before accept");
                continue;
            }
            Err(e) => return Err(SupervisorError::ListenerFailure(e)),
        };
        let local = stream
            .local_addr()
            .map_err(SupervisorError::ListenerFailure)?;

        tracing::debug!(%remote, %local, "accepted inbound connection");
        let conn = Connection::establish(stream, Origin::Passive, local, remote, port)?;
        return Ok(Event::NewPassiveConnection(conn));
    }
}

fn is_aborted_handshake(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}
