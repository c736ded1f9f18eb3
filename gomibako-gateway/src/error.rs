//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gomibako_core::CoreError;
use gomibako_hub::HubError;
use serde_json::json;

/// Errors that can occur during gateway request handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// An error propagated from the registry.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The bin key in the path is malformed.
    #[error(transparent)]
    InvalidKey(#[from] CoreError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Hub(HubError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Hub(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Hub(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
