//! Access lifecycle error types

use thiserror::Error;

use crate::telegram::TelegramError;

/// Access-lifecycle errors.
///
/// Variants fall into the taxonomy the callers rely on: integrity errors
/// (reject, no side effect), not-found conditions (callers decide whether
/// they are a no-op), transient platform errors (job retry), and persistence
/// errors (abort the whole operation).
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("Invalid payload: {0}")]
    PayloadInvalid(String),

    #[error("Payment amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: i64 },

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Telegram API error: {0}")]
    Telegram(#[from] TelegramError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AccessError {
    fn from(err: sqlx::Error) -> Self {
        AccessError::Database(err.to_string())
    }
}

impl AccessError {
    /// Integrity errors are rejected outright and must never be retried
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            AccessError::SignatureInvalid
                | AccessError::PayloadInvalid(_)
                | AccessError::AmountMismatch { .. }
        )
    }
}

pub type AccessResult<T> = Result<T, AccessError>;
