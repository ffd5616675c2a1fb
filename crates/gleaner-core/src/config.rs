use std::str::FromStr;
use std::time::Duration;

use crate::error::ScrapingError;
use crate::models::QualityTier;
use crate::pool::{DEFAULT_POLL_INTERVAL, DEFAULT_POOL_SIZE};

/// Desktop Chrome user agent sent by the plain HTTP tiers.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Tunables for the extraction pipeline.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Maximum live renderer instances.
    pub pool_size: usize,
    /// Backoff between acquisition attempts when the pool is saturated.
    pub poll_interval: Duration,
    /// Per-request deadline for navigation and plain GETs.
    pub request_timeout: Duration,
    pub quality_tier: QualityTier,
    /// Redirects followed by the plain HTTP tiers.
    pub max_redirects: usize,
    pub user_agent: String,
    /// Extra wait after load so late scripts can finish rendering.
    pub settle_delay: Duration,
    /// Body text cap for the metadata-only tier, in characters.
    pub body_text_cap: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
            quality_tier: QualityTier::High,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            settle_delay: Duration::from_millis(500),
            body_text_cap: 5000,
        }
    }
}

impl ExtractorConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// - `GLEANER_POOL_SIZE` (at least 1)
    /// - `GLEANER_POLL_INTERVAL_MS`
    /// - `GLEANER_REQUEST_TIMEOUT_SECS` (at least 1)
    /// - `GLEANER_QUALITY_TIER` (`thumbnail|standard|high|ultra`)
    /// - `GLEANER_MAX_REDIRECTS`
    /// - `GLEANER_USER_AGENT`
    /// - `GLEANER_SETTLE_DELAY_MS`
    /// - `GLEANER_BODY_TEXT_CAP`
    pub fn from_env() -> Result<Self, ScrapingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScrapingError> {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize>(&lookup, "GLEANER_POOL_SIZE")? {
            if size == 0 {
                return Err(ScrapingError::ConfigError(
                    "GLEANER_POOL_SIZE must be at least 1".into(),
                ));
            }
            config.pool_size = size;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "GLEANER_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "GLEANER_REQUEST_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ScrapingError::ConfigError(
                    "GLEANER_REQUEST_TIMEOUT_SECS must be at least 1".into(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("GLEANER_QUALITY_TIER") {
            config.quality_tier = raw.parse().map_err(ScrapingError::ConfigError)?;
        }
        if let Some(n) = parse_var::<usize>(&lookup, "GLEANER_MAX_REDIRECTS")? {
            config.max_redirects = n;
        }
        if let Some(ua) = lookup("GLEANER_USER_AGENT").filter(|ua| !ua.trim().is_empty()) {
            config.user_agent = ua;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "GLEANER_SETTLE_DELAY_MS")? {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(cap) = parse_var::<usize>(&lookup, "GLEANER_BODY_TEXT_CAP")? {
            config.body_text_cap = cap;
        }

        Ok(config)
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_quality_tier(mut self, tier: QualityTier) -> Self {
        self.quality_tier = tier;
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ScrapingError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ScrapingError::ConfigError(format!("Invalid {key} '{raw}': expected a number"))
        }),
    }
}
