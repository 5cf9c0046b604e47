//! Health check endpoint for the Courier server

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::CourierServer;

/// Health check handler
///
/// Reports the server version and the dedup ledger contents.
pub async fn health_check(State(server): State<Arc<CourierServer>>) -> impl IntoResponse {
    debug!("Health check requested");

    let ledger = server.service().ledger_stats().await;
    Json(json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "dedupLedger": ledger,
    }))
}
