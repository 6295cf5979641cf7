//! HTTP API handlers — read-only views of the supervisor status.

use std::net::IpAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tokio::sync::watch;

use bgpeer_session::{PeerStatus, StatusSnapshot};

#[derive(Clone)]
pub struct ApiState {
    /// Latest snapshot published by the supervisor.
    pub status: watch::Receiver<StatusSnapshot>,
}

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.status.borrow().clone())
}

// ── /peers ───────────────────────────────────────────────────────────────────

pub async fn handle_peers(State(state): State<ApiState>) -> Json<Vec<PeerStatus>> {
    Json(state.status.borrow().peers.clone())
}

pub async fn handle_peer(
    State(state): State<ApiState>,
    Path(addr): Path<String>,
) -> Result<Json<PeerStatus>, (StatusCode, String)> {
    let ip: IpAddr = addr
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid IP address".to_string()))?;
    let status = state.status.borrow();
    status
        .peer(ip)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown peer {ip}")))
}
