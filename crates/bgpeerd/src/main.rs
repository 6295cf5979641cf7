//! bgpeerd — keeps TCP sessions up with a configured set of BGP peers.
//!
//! Usage: bgpeerd [PEER_IP ...]
//! Peers given on the command line replace the configured list.

use anyhow::{Context, Result};

use bgpeer_core::config::parse_peers;
use bgpeer_core::BgpeerConfig;
use bgpeer_session::{Supervisor, SupervisorHandle};

mod local;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BgpeerConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BgpeerConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BgpeerConfig::default()
    });

    let mut supervisor_config = config
        .supervisor_config()
        .context("invalid configuration")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        supervisor_config.peers = parse_peers(&args).context("invalid peer on command line")?;
    }

    if config.peers.filter_local {
        match local::local_addresses() {
            Ok(addrs) => {
                supervisor_config.peers = local::without_local(supervisor_config.peers, &addrs);
            }
            Err(e) => tracing::warn!(error = %e, "could not list local addresses, not filtering"),
        }
    }

    if supervisor_config.peers.is_empty() {
        tracing::warn!("no peers configured, accepting inbound sessions only");
    }
    tracing::info!(
        port = supervisor_config.port,
        dial_timeout = ?supervisor_config.dial_timeout,
        peers = supervisor_config.peers.len(),
        "bgpeerd starting"
    );

    let supervisor = Supervisor::bind(supervisor_config)
        .await
        .context("failed to bind listening socket")?;
    let handle = supervisor.handle();

    // ── Shutdown signals ─────────────────────────────────────────────────────
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            handle.shutdown();
        });
    }

    // Status HTTP endpoint
    if config.network.api_port != 0 {
        spawn_api(&handle, config.network.api_port);
    }

    // ── Run until shutdown or fatal error ───────────────────────────────────
    match supervisor.run().await {
        Ok(()) => {
            tracing::info!("bgpeerd stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "bgpeerd terminating");
            Err(e).context("peering supervisor failed")
        }
    }
}

fn spawn_api(handle: &SupervisorHandle, port: u16) {
    let state = bgpeer_api::ApiState {
        status: handle.subscribe(),
    };
    tokio::spawn(async move {
        if let Err(e) = bgpeer_api::serve(state, port).await {
            tracing::error!(error = %e, "status server failed");
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot watch SIGTERM");
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
