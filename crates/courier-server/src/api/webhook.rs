//! Provider callback endpoints
//!
//! `GET` answers the subscription handshake. `POST` carries message and
//! status callbacks; once the signature checks out it always answers `200`
//! with a [`WebhookAck`], so the provider never retries because of our own
//! processing failures.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use courier_core::{WebhookAck, WebhookOutcome};

use super::errors::ApiError;
use crate::server::CourierServer;
use crate::signature::{verify_signature, SIGNATURE_HEADER};

/// Subscription handshake parameters
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Echo `hub.challenge` when the verify token matches
pub async fn verify_subscription(
    State(server): State<Arc<CourierServer>>,
    Path(tenant_token): Path<String>,
    Query(params): Query<VerifyParams>,
) -> Result<String, ApiError> {
    let subscribing = params.mode.as_deref() == Some("subscribe");
    match params.challenge {
        Some(challenge)
            if subscribing && server.validate_verify_token(params.verify_token.as_deref()) =>
        {
            info!(%tenant_token, "webhook subscription verified");
            Ok(challenge)
        }
        _ => {
            warn!(%tenant_token, "webhook subscription verification failed");
            Err(ApiError::Forbidden("Verification failed".to_string()))
        }
    }
}

/// Process one callback
pub async fn receive_callback(
    State(server): State<Arc<CourierServer>>,
    Path(tenant_token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = &server.config.app_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            warn!(%tenant_token, "rejecting callback with invalid signature");
            return Err(ApiError::Unauthorized("Invalid signature".to_string()));
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            info!(%tenant_token, error = %e, "callback body is not JSON");
            return Ok(Json(WebhookAck {
                success: true,
                outcome: WebhookOutcome::Ignored {
                    reason: format!("invalid JSON: {}", e),
                },
            }));
        }
    };

    Ok(Json(server.service().handle(&tenant_token, &payload).await))
}
