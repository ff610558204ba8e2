//! Dashboard API route handlers.
//!
//! All endpoints return JSON and read live agent state via `Arc<PredictionAgent>`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::agent::PredictionAgent;
use crate::types::{AccountStatus, StatusReport};

pub type AppState = Arc<PredictionAgent>;

#[derive(Debug, Clone, Serialize)]
pub struct AccountEntry {
    pub address: String,
    pub status: AccountStatus,
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(agent): State<AppState>) -> Json<StatusReport> {
    Json(agent.status())
}

/// GET /api/accounts
pub async fn get_accounts(State(agent): State<AppState>) -> Json<Vec<AccountEntry>> {
    let entries = agent
        .accounts()
        .iter()
        .map(|a| AccountEntry {
            address: a.address().to_string(),
            status: agent.account_status(a.address()),
        })
        .collect();
    Json(entries)
}
