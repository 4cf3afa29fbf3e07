//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use domain::DomainError;
use payments::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request carried no usable caller identity.
    #[error("{0}")]
    Unauthenticated(String),

    /// Malformed path, query or body.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthenticated(_) => ErrorKind::Unauthorized,
            ApiError::BadRequest(_) => ErrorKind::ValidationError,
            ApiError::Domain(err) => err.kind(),
            ApiError::Payment(err) => err.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        if matches!(self, ApiError::Unauthenticated(_)) {
            return StatusCode::UNAUTHORIZED;
        }
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::AlreadyExists | ErrorKind::AlreadyProcessed | ErrorKind::Conflict => {
                StatusCode::CONFLICT
            }
            ErrorKind::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidTransition
            | ErrorKind::InvalidOrderState
            | ErrorKind::PaymentRequired
            | ErrorKind::AmountMismatch
            | ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "success": false,
            "message": message,
            "kind": kind.as_str(),
        });
        (status, axum::Json(body)).into_response()
    }
}
