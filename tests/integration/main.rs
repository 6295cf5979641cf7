//! bgpeer integration test harness.
//!
//! Every test runs a real supervisor bound to 127.0.0.1 on an OS-assigned
//! port, which then serves as the well-known port. Remote peers are played
//! from other 127.0.0.0/8 addresses, so no test needs root and tests do not
//! share ports.
//!
//!   cargo test --test integration

mod accepting;
mod dialing;
mod lifecycle;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::task::JoinHandle;

use bgpeer_core::config::parse_peers;
use bgpeer_core::SupervisorConfig;
use bgpeer_session::{StatusSnapshot, Supervisor, SupervisorError, SupervisorHandle};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const WAIT: Duration = Duration::from_secs(5);

/// Short timers so retry paths run many times per second.
pub fn test_config(peers: &[&str]) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(parse_peers(peers).expect("test peers parse"));
    config.listen_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.port = 0;
    config.dial_timeout = Duration::from_millis(500);
    config.connect_retry = Duration::from_millis(50);
    config.heartbeat = Duration::from_millis(20);
    config.shutdown_grace = Duration::from_millis(500);
    config.bind_attempts = 1;
    config.snapshot_interval = Duration::ZERO;
    config
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("test address parses")
}

/// A supervisor running in the background.
pub struct Node {
    pub handle: SupervisorHandle,
    pub port: u16,
    pub addr: SocketAddr,
    run: JoinHandle<Result<(), SupervisorError>>,
}

impl Node {
    pub fn launch(supervisor: Supervisor) -> Self {
        let handle = supervisor.handle();
        let port = supervisor.port();
        let addr = supervisor.local_addr();
        let run = tokio::spawn(supervisor.run());
        Self {
            handle,
            port,
            addr,
            run,
        }
    }

    pub async fn start(config: SupervisorConfig) -> Result<Self> {
        let supervisor = Supervisor::bind(config).await.context("bind supervisor")?;
        Ok(Self::launch(supervisor))
    }

    /// Wait for `run` to return on its own.
    pub async fn finished(self) -> Result<Result<(), SupervisorError>> {
        tokio::time::timeout(WAIT, self.run)
            .await
            .context("supervisor did not exit")?
            .context("supervisor task panicked")
    }

    /// Request shutdown and wait for a clean exit.
    pub async fn stop(self) -> Result<()> {
        self.handle.shutdown();
        self.finished().await??;
        Ok(())
    }
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for(
    handle: &SupervisorHandle,
    what: &str,
    pred: impl Fn(&StatusSnapshot) -> bool,
) -> Result<StatusSnapshot> {
    let mut rx = handle.subscribe();
    let waited = tokio::time::timeout(WAIT, async {
        rx.wait_for(|s| pred(s)).await.map(|s| s.clone())
    })
    .await;
    match waited {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(_)) => bail!("supervisor exited while waiting for {what}"),
        Err(_) => Err(anyhow!("timed out waiting for {what}: {:?}", handle.status())),
    }
}

/// Connect to the supervisor from a chosen loopback source address.
pub async fn connect_from(src: &str, to: SocketAddr) -> Result<TcpStream> {
    let socket = TcpSocket::new_v4()?;
    socket.bind(SocketAddr::new(ip(src), 0))?;
    socket
        .connect(to)
        .await
        .with_context(|| format!("connect {src} -> {to}"))
}

/// Read the session greeting and check one echo round trip.
pub async fn greet_and_echo(stream: &mut TcpStream) -> Result<String> {
    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .context("no greeting")??;
    let greeting = String::from_utf8_lossy(&buf[..n]).to_string();
    if !greeting.starts_with("Hello from ") {
        bail!("unexpected greeting {greeting:?}");
    }

    stream.write_all(b"ping").await?;
    let mut echoed = [0u8; 4];
    tokio::time::timeout(WAIT, stream.read_exact(&mut echoed))
        .await
        .context("no echo")??;
    if &echoed != b"ping" {
        bail!("unexpected echo {echoed:?}");
    }
    Ok(greeting)
}
