use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::dto::ErrorResponse;

/// Configured bearer token, shared with the auth middleware.
#[derive(Clone)]
pub struct ApiKey(pub Arc<str>);

impl ApiKey {
    fn accepts(&self, token: &str) -> bool {
        token.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Rejects `/v1` requests whose bearer token does not match the API key.
pub async fn require_api_key(State(key): State<ApiKey>, request: Request, next: Next) -> Response {
    match bearer_token(request.headers()) {
        Some(token) if key.accepts(token) => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            axum::Json(ErrorResponse {
                error: "unauthorized".to_string(),
                message: "Send the API key as 'Authorization: Bearer <key>'".to_string(),
            }),
        )
            .into_response(),
    }
}
