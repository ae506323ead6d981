use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub workflow: String,
    pub synchronous: bool,
    pub max_wait_millis: u64,
    pub on_timeout_status: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CorrelationStatus {
    /// Entries currently parked, including expired ones not yet purged.
    pub pending: usize,
    pub default_ttl_secs: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let policy = state.policy.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        workflow: state.workflow.name().to_string(),
        synchronous: state.synchronous,
        max_wait_millis: policy.max_wait.as_millis() as u64,
        on_timeout_status: policy.on_timeout_status.as_u16(),
    })
}

pub async fn get_correlation(State(state): State<AppState>) -> Json<CorrelationStatus> {
    Json(CorrelationStatus {
        pending: state.cache.len(),
        default_ttl_secs: state.cache.default_ttl().as_secs(),
    })
}
