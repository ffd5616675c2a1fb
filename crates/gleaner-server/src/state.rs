use std::sync::Arc;

use gleaner_core::orchestrator::ExtractionOrchestrator;
use gleaner_core::pool::{PoolStats, ResourcePool};
use gleaner_core::traits::{ExtractionTier, RendererLauncher};

/// Largest batch accepted by `POST /v1/extract`.
pub const DEFAULT_MAX_BATCH: usize = 20;

/// Read-only view of a renderer pool for the health endpoint.
pub trait PoolStatus: Send + Sync {
    fn stats(&self) -> PoolStats;
}

impl<L: RendererLauncher> PoolStatus for ResourcePool<L> {
    fn stats(&self) -> PoolStats {
        ResourcePool::stats(self)
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState<..>>>`.
///
/// Generic over the three tiers so tests can drive the routes with mocks.
pub struct AppState<P, A, M>
where
    P: ExtractionTier,
    A: ExtractionTier,
    M: ExtractionTier,
{
    pub orchestrator: ExtractionOrchestrator<P, A, M>,
    /// Renderer pool reported by `/health` (None when the primary tier is not pooled).
    pub pool: Option<Arc<dyn PoolStatus>>,
    /// Bearer token for `/v1/*` (None = open API).
    pub api_key: Option<String>,
    pub max_batch: usize,
}

impl<P, A, M> AppState<P, A, M>
where
    P: ExtractionTier,
    A: ExtractionTier,
    M: ExtractionTier,
{
    pub fn new(orchestrator: ExtractionOrchestrator<P, A, M>) -> Self {
        Self {
            orchestrator,
            pool: None,
            api_key: None,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    pub fn with_pool(mut self, pool: Arc<dyn PoolStatus>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Require `Authorization: Bearer <key>`. Blank keys leave the API open.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max.max(1);
        self
    }
}
