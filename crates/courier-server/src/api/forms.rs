//! Form approval endpoint

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use courier_core::{FormDecision, FormInstanceId, FormStatus, ResolveOutcome};

use super::errors::ApiError;
use crate::server::CourierServer;

/// Decision body
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// `approved` or `rejected`
    pub status: FormStatus,
    /// Reviewer
    #[serde(default)]
    pub decided_by: Option<String>,
    /// Reviewer comment
    #[serde(default)]
    pub comment: Option<String>,
}

/// Apply an approval decision and resume the waiting execution
pub async fn decide_form(
    State(server): State<Arc<CourierServer>>,
    Path(form_instance_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if !server.validate_admin_token(token) {
        return Err(ApiError::Unauthorized(
            "Invalid or missing authentication token".to_string(),
        ));
    }

    let decision = FormDecision {
        form_instance_id: FormInstanceId(form_instance_id),
        status: request.status,
        decided_by: request.decided_by,
        comment: request.comment,
    };

    match server.service().decide_form(&decision).await? {
        ResolveOutcome::Resumed { execution_id } => {
            info!(
                form_instance_id = %decision.form_instance_id,
                execution_id = %execution_id,
                status = decision.status.as_str(),
                "form decision applied"
            );
            Ok(Json(json!({
                "formInstanceId": decision.form_instance_id,
                "status": decision.status,
                "executionId": execution_id,
            })))
        }
        other => Err(ApiError::ServerError(crate::error::ServerError::Conflict(
            format!("Decision was not applied: {:?}", other),
        ))),
    }
}
