use serde::Serialize;
use thiserror::Error;

/// Error kinds raised by any extraction tier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapingError {
    /// The renderer process could not be started.
    #[error("Renderer launch failed: {0}")]
    RendererLaunch(String),

    /// A running renderer stopped answering (tab could not be opened, process gone).
    #[error("Renderer crashed: {0}")]
    RendererCrashed(String),

    /// The page did not stabilize before the navigation deadline.
    #[error("Navigation timed out after {0} seconds")]
    NavigationTimeout(u64),

    /// The renderer reached the page but could not load or read it.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The target is not an absolute URL any tier could load.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No usable text was located on the page.
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Plain HTTP request could not reach the host.
    #[error("Network error: {0}")]
    NetworkFailure(String),

    /// The host answered, but not with something usable (status, body, redirect loop).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The lead image could not be downloaded.
    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    /// The lead image could not be decoded or re-encoded.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// A tier was skipped because its circuit breaker is open.
    #[error("Circuit '{name}' is open, retry after {retry_after_secs} seconds")]
    CircuitOpen { name: String, retry_after_secs: u64 },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ScrapingError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ScrapingError::RendererLaunch(_) => "RENDERER_LAUNCH_FAILURE",
            ScrapingError::RendererCrashed(_) => "RENDERER_CRASHED",
            ScrapingError::NavigationTimeout(_) => "NAVIGATION_TIMEOUT",
            ScrapingError::Navigation(_) => "NAVIGATION_FAILURE",
            ScrapingError::InvalidUrl(_) => "INVALID_URL",
            ScrapingError::ContentNotFound(_) => "CONTENT_NOT_FOUND",
            ScrapingError::NetworkFailure(_) => "NETWORK_FAILURE",
            ScrapingError::HttpError(_) => "HTTP_ERROR",
            ScrapingError::ImageFetch(_) => "IMAGE_FETCH_FAILURE",
            ScrapingError::ImageProcessing(_) => "IMAGE_PROCESSING_FAILURE",
            ScrapingError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            ScrapingError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Returns true if another tier is worth trying after this error.
    ///
    /// Renderer-side failures are retryable by the next tier; a failed plain
    /// GET is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapingError::RendererLaunch(_)
                | ScrapingError::RendererCrashed(_)
                | ScrapingError::NavigationTimeout(_)
                | ScrapingError::Navigation(_)
                | ScrapingError::ContentNotFound(_)
                | ScrapingError::CircuitOpen { .. }
        )
    }

    /// Returns true if this error should count against the renderer circuit.
    ///
    /// Only failures of the renderer process itself count. A page that will
    /// not load or a malformed URL says nothing about renderer health.
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            ScrapingError::RendererLaunch(_)
                | ScrapingError::RendererCrashed(_)
                | ScrapingError::NavigationTimeout(_)
        )
    }

    /// Returns true if the renderer that produced this error should be
    /// discarded rather than returned to the pool.
    pub fn renderer_is_broken(&self) -> bool {
        matches!(self, ScrapingError::RendererCrashed(_))
    }

    /// Extra context for the error, if any.
    pub fn details(&self) -> Option<String> {
        match self {
            ScrapingError::NavigationTimeout(secs) => Some(format!("deadline={secs}s")),
            ScrapingError::CircuitOpen {
                name,
                retry_after_secs,
            } => Some(format!("circuit={name}, retry_after={retry_after_secs}s")),
            _ => None,
        }
    }

    /// Serializable snapshot of this error.
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            message: self.to_string(),
            code: self.code().to_string(),
            retryable: self.is_retryable(),
            details: self.details(),
        }
    }
}

/// Flattened error record attached to results.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub code: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ScrapingError::RendererLaunch("crash".into()).is_retryable());
        assert!(ScrapingError::NavigationTimeout(30).is_retryable());
        assert!(ScrapingError::ContentNotFound("empty".into()).is_retryable());
        assert!(
            ScrapingError::CircuitOpen {
                name: "renderer".into(),
                retry_after_secs: 10,
            }
            .is_retryable()
        );
        assert!(!ScrapingError::NetworkFailure("refused".into()).is_retryable());
        assert!(!ScrapingError::ImageFetch("404".into()).is_retryable());
    }

    #[test]
    fn test_circuit_tripping() {
        assert!(ScrapingError::RendererLaunch("crash".into()).should_trip_circuit());
        assert!(ScrapingError::NavigationTimeout(30).should_trip_circuit());
        assert!(!ScrapingError::ContentNotFound("empty".into()).should_trip_circuit());
        assert!(!ScrapingError::NetworkFailure("refused".into()).should_trip_circuit());
        assert!(ScrapingError::RendererCrashed("tab".into()).should_trip_circuit());
    }

    #[test]
    fn test_page_and_input_errors_spare_the_circuit() {
        let dns = ScrapingError::Navigation("net::ERR_NAME_NOT_RESOLVED".into());
        assert!(!dns.should_trip_circuit());
        assert!(dns.is_retryable());

        let bad = ScrapingError::InvalidUrl("not a url".into());
        assert!(!bad.should_trip_circuit());
        assert!(!bad.is_retryable());
        assert_eq!(bad.code(), "INVALID_URL");

        assert!(ScrapingError::RendererCrashed("gone".into()).renderer_is_broken());
        assert!(!ScrapingError::NavigationTimeout(30).renderer_is_broken());
    }

    #[test]
    fn test_error_info_carries_code_and_flag() {
        let info = ScrapingError::NavigationTimeout(15).info();
        assert_eq!(info.code, "NAVIGATION_TIMEOUT");
        assert!(info.retryable);
        assert_eq!(info.details.as_deref(), Some("deadline=15s"));
        assert!(info.message.contains("15 seconds"));

        let info = ScrapingError::NetworkFailure("connection refused".into()).info();
        assert_eq!(info.code, "NETWORK_FAILURE");
        assert!(!info.retryable);
        assert!(info.details.is_none());
    }
}
