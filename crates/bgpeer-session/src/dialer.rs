//! Active dialer — one outbound connect attempt to one peer.
//!
//! A timed-out, refused, unreachable, or immediately reset attempt becomes
//! `DialTimedOut` after the retry wait, so the supervisor can reschedule without pacing
//! anything itself. Address problems and unclassified errors are fatal.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use bgpeer_core::{Origin, PeerId};

use crate::connection::Connection;
use crate::error::SupervisorError;
use crate::event::Event;

/// Dial `peer` on the well-known `port`.
pub async fn dial(
    peer: PeerId,
    port: u16,
    timeout: Duration,
    retry_wait: Duration,
) -> Result<Event, SupervisorError> {
    check_dialable(peer)?;

    let target = SocketAddr::new(peer.ip(), port);
    tracing::debug!(%peer, %target, "attempting connection");

    let reason = match time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => match addresses(&stream) {
            Ok((local, remote)) => {
                let conn = Connection::establish(stream, Origin::Active, local, remote, port)?;
                return Ok(Event::NewActiveConnection(conn));
            }
            Err(e) => classify(peer, e)?,
        },
        Ok(Err(e)) => classify(peer, e)?,
        Err(_) => format!("no answer within {timeout:?}"),
    };

    tracing::debug!(%peer, %reason, wait = ?retry_wait, "connection attempt failed");
    time::sleep(retry_wait).await;
    Ok(Event::DialTimedOut { peer, reason })
}

fn addresses(stream: &TcpStream) -> io::Result<(SocketAddr, SocketAddr)> {
    Ok((stream.local_addr()?, stream.peer_addr()?))
}

/// Reject targets no connect can ever succeed on.
fn check_dialable(peer: PeerId) -> Result<(), SupervisorError> {
    let reason = match peer.ip() {
        ip if ip.is_unspecified() => "unspecified address",
        ip if ip.is_multicast() => "multicast address",
        IpAddr::V4(v4) if v4.is_broadcast() => "broadcast address",
        _ => return Ok(()),
    };
    Err(SupervisorError::FatalAddress {
        peer,
        reason: reason.to_string(),
    })
}

/// Sort a connect error into retry (returns the reason) or fatal.
fn classify(peer: PeerId, e: io::Error) -> Result<String, SupervisorError> {
    use io::ErrorKind::*;

    if e.raw_os_error() == Some(libc::EAFNOSUPPORT) {
        return Err(SupervisorError::FatalAddress {
            peer,
            reason: e.to_string(),
        });
    }
    match e.kind() {
        TimedOut | ConnectionRefused | HostUnreachable | NetworkUnreachable => Ok(e.to_string()),
        // Remote accepted and then hung up on us straight away.
        ConnectionReset | ConnectionAborted | NotConnected => Ok(e.to_string()),
        AddrNotAvailable | InvalidInput | Unsupported => Err(SupervisorError::FatalAddress {
            peer,
            reason: e.to_string(),
        }),
        _ => Err(SupervisorError::UnknownTransport { peer, source: e }),
    }
}
