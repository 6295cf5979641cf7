//! Session worker — the per-connection exchange.
//!
//! Sends a greeting, then echoes whatever the peer sends until it closes.
//! This stands in for the real OPEN/KEEPALIVE/UPDATE exchange.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::connection::Connection;
use crate::event::{Event, SessionOutcome};

const READ_BUF: usize = 4096;

/// Run the session to completion and hand the connection back.
pub async fn run(mut connection: Connection) -> Event {
    let peer = connection.peer();
    tracing::debug!(%peer, origin = connection.origin().as_str(), "session started");

    let outcome = match exchange(&mut connection).await {
        Ok(()) => SessionOutcome::Closed,
        Err(e) => SessionOutcome::Failed(e),
    };
    Event::SessionEnded {
        connection,
        outcome,
    }
}

pub fn greeting(connection: &Connection) -> String {
    format!("Hello from {}", connection.local_addr())
}

async fn exchange(connection: &mut Connection) -> io::Result<()> {
    let hello = greeting(connection);
    connection.stream.write_all(hello.as_bytes()).await?;

    let mut buf = BytesMut::with_capacity(READ_BUF);
    loop {
        buf.clear();
        let n = connection.stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        tracing::trace!(peer = %connection.peer(), bytes = n, "echo");
        connection.stream.write_all(&buf).await?;
    }
}
