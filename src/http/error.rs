//! Mapping of `EcommerceError` onto HTTP responses.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use crate::EcommerceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub retryable: bool,
}

/// Wrapper so handlers can `?` crate errors straight into a response.
#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            EcommerceError::InsufficientStock { .. } | EcommerceError::EmptyCart => (
                StatusCode::CONFLICT,
                ErrorBody { error: "rejected".into(), warning: Some(self.0.to_string()), retryable: false },
            ),
            EcommerceError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody { error: "invalid".into(), warning: Some(self.0.to_string()), retryable: false },
            ),
            // Same answer for "missing" and "someone else's".
            EcommerceError::NotFound(_) | EcommerceError::Unauthorized => (
                StatusCode::NOT_FOUND,
                ErrorBody { error: "Not found".into(), warning: None, retryable: false },
            ),
            EcommerceError::GatewayUnavailable(_) | EcommerceError::GatewayRejected(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody { error: self.0.to_string(), warning: None, retryable: true },
            ),
            EcommerceError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                ErrorBody { error: self.0.to_string(), warning: None, retryable: false },
            ),
            EcommerceError::StorageError(detail) => {
                tracing::error!(error = %detail, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody { error: "Internal error".into(), warning: None, retryable: true })
            }
        };
        (status, Json(body)).into_response()
    }
}
