//! Error responses.
//!
//! # Responsibilities
//! - Map domain errors to HTTP status codes
//! - Render a uniform JSON error body
//!
//! ```text
//! { "error": "VALIDATION_FAILED", "message": "...", "details": [ {key, reason} ] }
//! ```
//!
//! Errors the caller may resend unchanged also carry `"retryable": true`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::ConfigCenterError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

pub fn status_for(err: &ConfigCenterError) -> StatusCode {
    match err {
        ConfigCenterError::NotFound { .. } => StatusCode::NOT_FOUND,
        ConfigCenterError::CyclicInheritance { .. }
        | ConfigCenterError::InvalidSnapshotState { .. }
        | ConfigCenterError::VersionConflict { .. }
        | ConfigCenterError::AlreadyExists { .. } => StatusCode::CONFLICT,
        ConfigCenterError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ConfigCenterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ConfigCenterError::ConnectionLost(_) => StatusCode::GONE,
    }
}

impl IntoResponse for ConfigCenterError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let details = match &self {
            ConfigCenterError::ValidationFailed(violations) => serde_json::to_value(violations).ok(),
            ConfigCenterError::VersionConflict { expected, actual } => {
                Some(json!({ "expected": expected, "actual": actual }))
            }
            ConfigCenterError::CyclicInheritance { chain } => Some(json!({ "chain": chain })),
            ConfigCenterError::NotFound { kind, id } => Some(json!({ "kind": kind, "id": id })),
            _ => None,
        };

        if status.is_client_error() {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            details,
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
