use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external service: {0}")]
    ExternalService(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Business faults are reported to the caller and never retried.
    /// Infrastructure faults may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalService(_) | Self::Database(_) | Self::Serialization(_)
        )
    }
}
