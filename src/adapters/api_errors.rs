use crate::domain::error::ServiceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so it can be turned into an axum response.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ServiceError::InvalidState(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_state", msg.clone())
            }
            ServiceError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            ServiceError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ServiceError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ServiceError::ExternalService(msg) => {
                tracing::error!("external service error: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "external_service_error",
                    format!("payment provider unavailable: {msg}"),
                )
            }
            ServiceError::WebhookSignature(_) => (
                StatusCode::BAD_REQUEST,
                "webhook_error",
                "invalid webhook signature".to_string(),
            ),
            ServiceError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            ServiceError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            ServiceError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
