use serde::{Deserialize, Serialize};

use gleaner_core::models::ExtractionResult;
use gleaner_core::pool::PoolStats;

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// Either a single `url` or a batch in `urls`; both may be given.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl ExtractRequest {
    /// All requested URLs, single `url` first, blanks dropped.
    pub fn targets(&self) -> Vec<String> {
        self.url
            .iter()
            .chain(self.urls.iter())
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub results: Vec<ExtractionResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<Vec<ExtractionResult>> for ExtractResponse {
    fn from(results: Vec<ExtractionResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            failed: results.len() - succeeded,
            succeeded,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub domain: String,
    pub strategy: String,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
