//! Configuration system for bgpeer.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BGPEER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/bgpeer/config.toml
//!   3. ~/.config/bgpeer/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::PeerId;

/// The well-known BGP port.
pub const DEFAULT_PORT: u16 = 179;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BgpeerConfig {
    pub network: NetworkConfig,
    pub peers: PeersConfig,
    pub timers: TimersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the listening socket binds to.
    pub listen_addr: String,
    /// Well-known port, used for both listening and dialing. 0 = OS-assigned.
    pub port: u16,
    /// Local HTTP status port. 0 = disabled.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Peer IP addresses to keep sessions with.
    pub addresses: Vec<String>,
    /// Drop peers that are addresses of this host.
    pub filter_local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    /// Bound on a single outbound connect.
    pub dial_timeout_secs: f64,
    /// Wait after a timed-out or refused dial. Unset = dial_timeout_secs.
    pub connect_retry_secs: Option<f64>,
    /// Upper bound on one supervisor wait.
    pub heartbeat_millis: u64,
    /// How long outstanding tasks get to exit before they are aborted.
    pub shutdown_grace_secs: f64,
    /// Bind attempts while the port is in use.
    pub bind_attempts: u32,
    pub bind_retry_secs: f64,
    /// Interval of the registry snapshot log line. 0 = never.
    pub snapshot_interval_secs: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: Ipv4Addr::UNSPECIFIED.to_string(),
            port: DEFAULT_PORT,
            api_port: 0,
        }
    }
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            filter_local: true,
        }
    }
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 10.0,
            connect_retry_secs: None,
            heartbeat_millis: 250,
            shutdown_grace_secs: 2.0,
            bind_attempts: 100,
            bind_retry_secs: 3.0,
            snapshot_interval_secs: 5.0,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("bgpeer")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid peer address {0:?}")]
    InvalidPeer(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BgpeerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BgpeerConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BGPEER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BgpeerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BGPEER_* overrides, reading variables through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BGPEER_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = lookup("BGPEER_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("BGPEER_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Some(v) = lookup("BGPEER_PEERS__ADDRESSES") {
            self.peers.addresses = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("BGPEER_TIMERS__DIAL_TIMEOUT_SECS") {
            if let Ok(t) = v.parse() {
                self.timers.dial_timeout_secs = t;
            }
        }
    }

    /// Validate into the runtime form consumed by the supervisor.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        let listen_addr = self.network.listen_addr.parse::<IpAddr>().map_err(|_| {
            ConfigError::InvalidValue {
                field: "network.listen_addr",
                value: self.network.listen_addr.clone(),
            }
        })?;

        let peers = parse_peers(&self.peers.addresses)?;

        let t = &self.timers;
        // Zero would leave redials unpaced.
        let dial_timeout = nonzero_secs("timers.dial_timeout_secs", t.dial_timeout_secs)?;
        let connect_retry = match t.connect_retry_secs {
            Some(v) => nonzero_secs("timers.connect_retry_secs", v)?,
            None => dial_timeout,
        };
        if t.heartbeat_millis == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timers.heartbeat_millis",
                value: "0".into(),
            });
        }

        Ok(SupervisorConfig {
            listen_addr,
            port: self.network.port,
            peers,
            dial_timeout,
            connect_retry,
            heartbeat: Duration::from_millis(t.heartbeat_millis),
            shutdown_grace: secs("timers.shutdown_grace_secs", t.shutdown_grace_secs)?,
            bind_attempts: t.bind_attempts.max(1),
            bind_retry: secs("timers.bind_retry_secs", t.bind_retry_secs)?,
            snapshot_interval: secs("timers.snapshot_interval_secs", t.snapshot_interval_secs)?,
        })
    }
}

/// Parse peer address strings. Duplicates are dropped, first occurrence wins.
pub fn parse_peers<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<PeerId>, ConfigError> {
    let mut peers: Vec<PeerId> = Vec::with_capacity(addresses.len());
    for raw in addresses {
        let raw = raw.as_ref().trim();
        let ip = raw
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidPeer(raw.to_string()))?;
        let peer = PeerId::new(ip);
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }
    Ok(peers)
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn nonzero_secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    match secs(field, value)? {
        d if d.is_zero() => Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
        }),
        d => Ok(d),
    }
}

// ── Runtime form ──────────────────────────────────────────────────────────────

/// Validated settings for one supervisor instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub listen_addr: IpAddr,
    pub port: u16,
    pub peers: Vec<PeerId>,
    pub dial_timeout: Duration,
    pub connect_retry: Duration,
    pub heartbeat: Duration,
    pub shutdown_grace: Duration,
    pub bind_attempts: u32,
    pub bind_retry: Duration,
    pub snapshot_interval: Duration,
}

impl SupervisorConfig {
    /// Defaults for everything except the peer list.
    pub fn new(peers: Vec<PeerId>) -> Self {
        let timers = TimersConfig::default();
        let dial_timeout = Duration::from_secs_f64(timers.dial_timeout_secs);
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            peers,
            dial_timeout,
            connect_retry: dial_timeout,
            heartbeat: Duration::from_millis(timers.heartbeat_millis),
            shutdown_grace: Duration::from_secs_f64(timers.shutdown_grace_secs),
            bind_attempts: timers.bind_attempts,
            bind_retry: Duration::from_secs_f64(timers.bind_retry_secs),
            snapshot_interval: Duration::from_secs_f64(timers.snapshot_interval_secs),
        }
    }
}
