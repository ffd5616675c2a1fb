//! Circuit breaker for the renderer tier.
//!
//! When Chromium keeps failing to launch or to load pages, every request
//! would otherwise pay the full navigation timeout before falling through.
//! The breaker short-circuits the tier until a recovery window has passed.
//!
//! ```text
//! Closed --[threshold renderer failures]--> Open --[recovery_timeout]--> HalfOpen
//!   ^                                        ^                              |
//!   |                                        +--------[probe fails]---------+
//!   +-----------------------[success_threshold probes ok]-------------------+
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::ScrapingError;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive renderer failures that open the circuit.
    pub failure_threshold: u32,
    /// Successful half-open probes that close it again.
    pub success_threshold: u32,
    /// How long the circuit stays open before probing.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Internal phase; each variant carries only the counters it needs.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Cloneable breaker; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    phase: Arc<Mutex<Phase>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            config,
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned breaker mutex");
            poisoned.into_inner()
        })
    }

    /// Move Open to HalfOpen once the recovery window has elapsed.
    fn refresh(&self, phase: &mut Phase) {
        if let Phase::Open { since } = *phase
            && since.elapsed() >= self.config.recovery_timeout
        {
            tracing::info!(circuit = %self.name, "Circuit half-open, probing renderer");
            *phase = Phase::HalfOpen { successes: 0 };
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut phase = self.lock_phase();
        self.refresh(&mut phase);
        phase.state()
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// An open circuit yields [`ScrapingError::CircuitOpen`] without running
    /// the operation. Only errors with [`ScrapingError::should_trip_circuit`]
    /// count against the renderer.
    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T, ScrapingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ScrapingError>>,
    {
        {
            let mut phase = self.lock_phase();
            self.refresh(&mut phase);
            if let Phase::Open { since } = *phase {
                let remaining = self.config.recovery_timeout.saturating_sub(since.elapsed());
                return Err(ScrapingError::CircuitOpen {
                    name: self.name.to_string(),
                    retry_after_secs: remaining.as_secs().max(1),
                });
            }
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(e) if e.should_trip_circuit() => self.on_failure(e),
            Err(_) => {}
        }
        result
    }

    fn on_success(&self) {
        let mut phase = self.lock_phase();
        *phase = match *phase {
            Phase::HalfOpen { successes } if successes + 1 >= self.config.success_threshold => {
                tracing::info!(circuit = %self.name, "Circuit closed, renderer recovered");
                Phase::Closed { failures: 0 }
            }
            Phase::HalfOpen { successes } => Phase::HalfOpen {
                successes: successes + 1,
            },
            Phase::Closed { .. } => Phase::Closed { failures: 0 },
            open @ Phase::Open { .. } => open,
        };
    }

    fn on_failure(&self, error: &ScrapingError) {
        let mut phase = self.lock_phase();
        *phase = match *phase {
            Phase::Closed { failures } if failures + 1 >= self.config.failure_threshold => {
                tracing::warn!(
                    circuit = %self.name,
                    failures = failures + 1,
                    error = %error,
                    "Circuit opened"
                );
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Closed { failures } => Phase::Closed {
                failures: failures + 1,
            },
            Phase::HalfOpen { .. } => {
                tracing::warn!(circuit = %self.name, error = %error, "Probe failed, circuit re-opened");
                Phase::Open {
                    since: Instant::now(),
                }
            }
            open @ Phase::Open { .. } => open,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "renderer",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 1,
                recovery_timeout,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker, error: ScrapingError) -> ScrapingError {
        cb.call(|| async { Err::<(), _>(error) }).await.unwrap_err()
    }

    async fn succeed(cb: &CircuitBreaker) {
        cb.call(|| async { Ok::<_, ScrapingError>(()) }).await.unwrap();
    }

    fn launch_failure() -> ScrapingError {
        ScrapingError::RendererLaunch("chrome missing".into())
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb, launch_failure()).await;
        fail(&cb, launch_failure()).await;
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb, ScrapingError::NavigationTimeout(30)).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_the_count() {
        let cb = breaker(3, Duration::from_secs(60));

        fail(&cb, launch_failure()).await;
        fail(&cb, launch_failure()).await;
        succeed(&cb).await;
        fail(&cb, launch_failure()).await;
        fail(&cb, launch_failure()).await;

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_skips_the_operation() {
        let cb = breaker(1, Duration::from_secs(60));
        fail(&cb, launch_failure()).await;

        let mut ran = false;
        let err = cb
            .call(|| async {
                ran = true;
                Ok::<_, ScrapingError>(())
            })
            .await
            .unwrap_err();

        assert!(!ran);
        assert!(matches!(err, ScrapingError::CircuitOpen { ref name, .. } if name == "renderer"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn half_open_probe_closes_or_reopens() {
        let cb = breaker(1, Duration::from_millis(5));

        fail(&cb, launch_failure()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb, launch_failure()).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(10)).await;
        succeed(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn content_errors_do_not_count() {
        let cb = breaker(1, Duration::from_secs(60));

        fail(&cb, ScrapingError::ContentNotFound("thin page".into())).await;
        fail(&cb, ScrapingError::ImageFetch("404".into())).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
