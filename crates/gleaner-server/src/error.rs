use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::dto::ErrorResponse;

/// Request rejections. Extraction itself never fails at this layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request must contain `url` or a non-empty `urls` list")]
    EmptyRequest,

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Batch of {got} URLs exceeds the limit of {max}")]
    TooManyUrls { got: usize, max: usize },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::EmptyRequest | ApiError::InvalidUrl { .. } => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            ApiError::TooManyUrls { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "too_many_urls"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
