//! Single entry point chaining the extraction tiers.
//!
//! ```text
//! Primary --fail--> ArticleFallback --fail--> MetadataFallback --fail--> Done(stub)
//!    |                    |                          |
//!    +----ok----> Done <--+-----------ok-------------+
//! ```
//!
//! Every tier error is caught here and turned into a transition. The caller
//! always receives a result; failures of earlier tiers travel along in
//! `tier_errors`.

use std::fmt;
use std::time::Instant;

use crate::error::ScrapingError;
use crate::models::{ExtractionResult, STUB_METHOD, TierFailure};
use crate::monitor::StrategyMonitor;
use crate::traits::ExtractionTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    ArticleFallback,
    MetadataFallback,
    Done,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::Primary => Stage::ArticleFallback,
            Stage::ArticleFallback => Stage::MetadataFallback,
            Stage::MetadataFallback | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Primary => write!(f, "primary"),
            Stage::ArticleFallback => write!(f, "article-fallback"),
            Stage::MetadataFallback => write!(f, "metadata-fallback"),
            Stage::Done => write!(f, "done"),
        }
    }
}

/// Generic over each tier so tests can inject mocks.
pub struct ExtractionOrchestrator<P, A, M>
where
    P: ExtractionTier,
    A: ExtractionTier,
    M: ExtractionTier,
{
    primary: P,
    article: A,
    metadata: M,
    monitor: StrategyMonitor,
}

impl<P, A, M> ExtractionOrchestrator<P, A, M>
where
    P: ExtractionTier,
    A: ExtractionTier,
    M: ExtractionTier,
{
    pub fn new(primary: P, article: A, metadata: M, monitor: StrategyMonitor) -> Self {
        Self {
            primary,
            article,
            metadata,
            monitor,
        }
    }

    pub fn monitor(&self) -> &StrategyMonitor {
        &self.monitor
    }

    /// Extract `url`, falling through tiers until one succeeds. Never fails.
    pub async fn extract(&self, url: &str) -> ExtractionResult {
        let mut failures: Vec<TierFailure> = Vec::new();
        let mut last_error: Option<ScrapingError> = None;
        let mut stage = Stage::Primary;

        while stage != Stage::Done {
            let (method, outcome) = match stage {
                Stage::Primary => self.run_tier(&self.primary, url).await,
                Stage::ArticleFallback => self.run_tier(&self.article, url).await,
                Stage::MetadataFallback => self.run_tier(&self.metadata, url).await,
                Stage::Done => break,
            };

            match outcome {
                Ok(mut result) if result.success => {
                    tracing::info!(
                        %url,
                        %stage,
                        method = %result.method,
                        failed_tiers = failures.len(),
                        "Extraction succeeded"
                    );
                    result.tier_errors = failures;
                    return result;
                }
                // The last tier's own degraded result is returned as-is.
                Ok(mut result) if stage == Stage::MetadataFallback => {
                    tracing::warn!(%url, error = ?result.error, "All tiers degraded");
                    if result.error.as_deref().is_none_or(str::is_empty) {
                        result.error = Some(
                            last_error
                                .as_ref()
                                .map(|e| e.to_string())
                                .unwrap_or_else(|| "Extraction failed".to_string()),
                        );
                    }
                    result.tier_errors = failures;
                    return result;
                }
                Ok(result) => {
                    let error = ScrapingError::ContentNotFound(
                        result
                            .error
                            .unwrap_or_else(|| "tier reported failure".to_string()),
                    );
                    tracing::warn!(%url, %stage, %method, %error, "Tier failed, falling through");
                    failures.push(TierFailure {
                        method,
                        error: error.info(),
                    });
                    last_error = Some(error);
                }
                Err(error) => {
                    tracing::warn!(
                        %url,
                        %stage,
                        %method,
                        code = error.code(),
                        retryable = error.is_retryable(),
                        %error,
                        "Tier failed, falling through"
                    );
                    failures.push(TierFailure {
                        method,
                        error: error.info(),
                    });
                    last_error = Some(error);
                }
            }

            stage = stage.next();
        }

        let error = last_error
            .unwrap_or_else(|| ScrapingError::ContentNotFound("no tier produced a result".into()));
        tracing::warn!(%url, %error, "All extraction tiers failed, returning stub");
        let mut stub = ExtractionResult::failure(url, STUB_METHOD, &error);
        stub.tier_errors = failures;
        stub
    }

    /// Run one tier and record its outcome with its own latency.
    async fn run_tier<T: ExtractionTier>(
        &self,
        tier: &T,
        url: &str,
    ) -> (String, Result<ExtractionResult, ScrapingError>) {
        let method = tier.name().to_string();
        tracing::debug!(%url, %method, "Trying tier");

        let start = Instant::now();
        let outcome = tier.extract(url).await;
        let elapsed = start.elapsed();

        match &outcome {
            Ok(result) => self.monitor.record(result, elapsed),
            Err(error) => self
                .monitor
                .record(&ExtractionResult::failure(url, &method, error), elapsed),
        }

        (method, outcome)
    }
}
