use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use url::Url;

use gleaner_core::monitor::ScrapingMetrics;
use gleaner_core::traits::ExtractionTier;

use crate::auth::{ApiKey, require_api_key};
use crate::dto::{
    ExtractRequest, ExtractResponse, HealthResponse, RecommendationQuery, RecommendationResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

/// Request bodies are lists of URLs; anything larger is rejected.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full router with all routes and middleware.
pub fn router<P, A, M>(state: Arc<AppState<P, A, M>>) -> Router
where
    P: ExtractionTier + 'static,
    A: ExtractionTier + 'static,
    M: ExtractionTier + 'static,
{
    let mut api = Router::new()
        .route("/v1/extract", post(extract::<P, A, M>))
        .route("/v1/metrics", get(metrics::<P, A, M>))
        .route("/v1/metrics/recommendation", get(recommendation::<P, A, M>));

    match &state.api_key {
        Some(key) => {
            api = api.layer(middleware::from_fn_with_state(
                ApiKey(Arc::from(key.as_str())),
                require_api_key,
            ));
        }
        None => tracing::warn!("No API key configured, /v1 endpoints are open"),
    }

    let public = Router::new().route("/health", get(health::<P, A, M>));

    public
        .merge(api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// Only absolute http(s) URLs reach the pipeline.
fn validate_target(raw: &str) -> Result<(), ApiError> {
    let invalid = |reason: String| ApiError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

pub async fn extract<P, A, M>(
    State(state): State<Arc<AppState<P, A, M>>>,
    axum::Json(body): axum::Json<ExtractRequest>,
) -> Result<axum::Json<ExtractResponse>, ApiError>
where
    P: ExtractionTier + 'static,
    A: ExtractionTier + 'static,
    M: ExtractionTier + 'static,
{
    let targets = body.targets();
    if targets.is_empty() {
        return Err(ApiError::EmptyRequest);
    }
    if targets.len() > state.max_batch {
        return Err(ApiError::TooManyUrls {
            got: targets.len(),
            max: state.max_batch,
        });
    }
    for url in &targets {
        validate_target(url)?;
    }

    tracing::info!(urls = targets.len(), "Extract request");
    let results =
        futures::future::join_all(targets.iter().map(|url| state.orchestrator.extract(url)))
            .await;

    Ok(axum::Json(ExtractResponse::from(results)))
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

pub async fn metrics<P, A, M>(
    State(state): State<Arc<AppState<P, A, M>>>,
) -> axum::Json<ScrapingMetrics>
where
    P: ExtractionTier + 'static,
    A: ExtractionTier + 'static,
    M: ExtractionTier + 'static,
{
    axum::Json(state.orchestrator.monitor().metrics())
}

pub async fn recommendation<P, A, M>(
    State(state): State<Arc<AppState<P, A, M>>>,
    Query(query): Query<RecommendationQuery>,
) -> axum::Json<RecommendationResponse>
where
    P: ExtractionTier + 'static,
    A: ExtractionTier + 'static,
    M: ExtractionTier + 'static,
{
    let domain = query.domain.trim().to_lowercase();
    let strategy = state.orchestrator.monitor().recommend_strategy(&domain);
    axum::Json(RecommendationResponse { domain, strategy })
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub async fn health<P, A, M>(
    State(state): State<Arc<AppState<P, A, M>>>,
) -> axum::Json<HealthResponse>
where
    P: ExtractionTier + 'static,
    A: ExtractionTier + 'static,
    M: ExtractionTier + 'static,
{
    axum::Json(HealthResponse {
        status: "healthy",
        pool: state.pool.as_ref().map(|p| p.stats()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_target_accepts_http_only() {
        assert!(validate_target("https://example.com/a").is_ok());
        assert!(validate_target("http://example.com").is_ok());
        assert!(matches!(
            validate_target("ftp://example.com"),
            Err(ApiError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_target("example.com"),
            Err(ApiError::InvalidUrl { .. })
        ));
    }
}
