//! Listening socket setup.
//!
//! SO_REUSEADDR is set before bind. "Address in use" is retried a bounded
//! number of times; every other bind error is final.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::SupervisorError;

const BACKLOG: i32 = 128;

pub async fn bind(
    addr: SocketAddr,
    attempts: u32,
    retry: Duration,
) -> Result<TcpListener, SupervisorError> {
    let mut attempt = 1;
    loop {
        match bind_once(addr) {
            Ok(listener) => {
                if attempt > 1 {
                    tracing::info!(%addr, attempt, "bind succeeded");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempt < attempts => {
                if attempt == 1 {
                    tracing::warn!(%addr, "address in use, will wait and try again");
                } else {
                    tracing::debug!(%addr, attempt, "address still in use");
                }
                tokio::time::sleep(retry).await;
                attempt += 1;
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::AddrInUse {
                    tracing::error!(%addr, attempts, "address still in use, giving up");
                }
                return Err(SupervisorError::Bind { addr, source: e });
            }
        }
    }
}

fn bind_once(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        // Accept IPv4 peers on a wildcard IPv6 listener too.
        socket.set_only_v6(false)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}
