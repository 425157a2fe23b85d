//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use channelgate_access::AccessError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Payment integrity error: {0}")]
    PaymentIntegrity(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::PaymentIntegrity(msg) => {
                (StatusCode::BAD_REQUEST, "PAYMENT_INTEGRITY", msg.clone())
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match &err {
            AccessError::SignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            AccessError::PayloadInvalid(msg) => ApiError::BadRequest(msg.clone()),
            AccessError::AmountMismatch { .. } => ApiError::PaymentIntegrity(err.to_string()),
            AccessError::SubscriptionNotFound(_) | AccessError::NotFound(_) => ApiError::NotFound,
            AccessError::Database(msg) => ApiError::Database(msg.clone()),
            AccessError::Telegram(_) | AccessError::Config(_) | AccessError::Internal(_) => {
                tracing::error!(error = %err, "Internal error handling request");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_errors_map_to_4xx() {
        let err: ApiError = AccessError::SignatureInvalid.into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = AccessError::AmountMismatch {
            expected: 500,
            received: 400,
        }
        .into();
        assert!(matches!(err, ApiError::PaymentIntegrity(_)));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err: ApiError = AccessError::SubscriptionNotFound("sub-1".to_string()).into();
        assert!(matches!(err, ApiError::NotFound));
    }
}
