//! API module for the Courier server
//!
//! This module contains the HTTP routes and handlers.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod forms;
pub mod health;
pub mod webhook;

use crate::server::CourierServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<CourierServer>) -> Router {
    Router::new()
        // Provider callbacks
        .route(
            "/v1/webhooks/:tenant_token",
            get(webhook::verify_subscription).post(webhook::receive_callback),
        )
        // Form approvals
        .route(
            "/v1/forms/:form_instance_id/decision",
            post(forms::decide_form),
        )
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
