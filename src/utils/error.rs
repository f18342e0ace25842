use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the retrieval core (see spec §7).
///
/// Ingestion fails loudly through these variants; the query path never
/// surfaces them to a caller directly — any retrieval-side failure
/// degrades to an empty/partial result instead (see `context::ContextReply`).
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Backend timeout: {0}")]
    BackendTimeout(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// HTTP-layer concern named explicitly in spec §6 (`POST /api/documents`
    /// returns 413 on oversize); not one of the retrieval-error kinds in §7.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::InvalidInput(msg) => {
                tracing::warn!("Invalid input: {}", msg);
                (StatusCode::BAD_REQUEST, "InvalidInput", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, "Forbidden", msg)
            }
            ApiError::BackendTimeout(msg) => {
                tracing::error!("Backend timeout: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, "BackendTimeout", msg)
            }
            ApiError::BackendError(msg) => {
                tracing::error!("Backend error: {}", msg);
                (StatusCode::BAD_GATEWAY, "BackendError", msg)
            }
            ApiError::CapacityExceeded(msg) => {
                tracing::warn!("Capacity exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, "CapacityExceeded", msg)
            }
            ApiError::PayloadTooLarge(msg) => {
                tracing::warn!("Payload too large: {}", msg);
                (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::BackendError(err.to_string())
    }
}
