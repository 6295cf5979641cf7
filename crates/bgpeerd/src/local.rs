//! Host address discovery, used to drop peers that are really us.

use std::collections::HashSet;
use std::net::IpAddr;

use anyhow::{Context, Result};
use nix::ifaddrs::getifaddrs;

use bgpeer_core::PeerId;

/// Every IPv4 and IPv6 address assigned to a local interface.
pub fn local_addresses() -> Result<HashSet<IpAddr>> {
    let mut addrs = HashSet::new();
    for ifaddr in getifaddrs().context("getifaddrs")? {
        let Some(address) = ifaddr.address else {
            continue;
        };
        if let Some(v4) = address.as_sockaddr_in() {
            addrs.insert(IpAddr::V4(v4.ip()));
        } else if let Some(v6) = address.as_sockaddr_in6() {
            addrs.insert(IpAddr::V6(v6.ip()));
        }
    }
    Ok(addrs)
}

/// Keep the peers that are not addresses of this host.
pub fn without_local(peers: Vec<PeerId>, local: &HashSet<IpAddr>) -> Vec<PeerId> {
    peers
        .into_iter()
        .filter(|peer| {
            let is_local = local.contains(&peer.ip());
            if is_local {
                tracing::info!(%peer, "skipping local address");
            } else {
                tracing::info!(%peer, "using peer");
            }
            !is_local
        })
        .collect()
}
