pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod pool;
pub mod text;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::ExtractorConfig;
pub use error::{ErrorInfo, ScrapingError};
pub use models::{
    CandidateSource, EnhancedImageResult, ExtractionResult, ImageCandidate, MediaMetadata,
    MediaType, QualityTier, STUB_METHOD, TierFailure, compute_hash,
};
pub use monitor::{ScrapingMetrics, StrategyMonitor};
pub use orchestrator::ExtractionOrchestrator;
pub use pool::{PoolStats, RendererHandle, ResourcePool};
pub use traits::{ExtractionTier, Fetcher, RenderedPage, Renderer, RendererLauncher};
