//! In-process record of extraction outcomes, used for observability and
//! per-domain strategy recommendations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::models::ExtractionResult;

/// Rolling statistics for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainStats {
    pub count: u64,
    /// Running mean of the 0/1 success signal.
    pub success_rate: f64,
    /// Running mean in milliseconds.
    pub avg_load_time: f64,
    /// Successful extractions per method for this domain.
    pub strategy_success: BTreeMap<String, u64>,
}

/// Aggregate, process-lifetime statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapingMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Running mean in milliseconds.
    pub average_load_time: f64,
    pub strategy_success: BTreeMap<String, u64>,
    pub domain_stats: BTreeMap<String, DomainStats>,
}

/// Online mean update: `(old * (n - 1) + sample) / n`.
fn running_mean(old: f64, n: u64, sample: f64) -> f64 {
    if n == 0 {
        return sample;
    }
    (old * (n - 1) as f64 + sample) / n as f64
}

/// Shared, cloneable monitor. Clones observe the same metrics.
#[derive(Clone)]
pub struct StrategyMonitor {
    default_strategy: String,
    inner: Arc<Mutex<ScrapingMetrics>>,
}

impl StrategyMonitor {
    /// `default_strategy` is returned by [`recommend_strategy`](Self::recommend_strategy)
    /// when a domain has no history.
    pub fn new(default_strategy: impl Into<String>) -> Self {
        Self {
            default_strategy: default_strategy.into(),
            inner: Arc::new(Mutex::new(ScrapingMetrics::default())),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, ScrapingMetrics> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned metrics mutex");
            poisoned.into_inner()
        })
    }

    /// Record one extraction attempt.
    pub fn record(&self, result: &ExtractionResult, load_time: Duration) {
        let load_ms = load_time.as_secs_f64() * 1000.0;
        let mut metrics = self.lock_inner();

        metrics.total_requests += 1;
        if result.success {
            metrics.success_count += 1;
            *metrics
                .strategy_success
                .entry(result.method.clone())
                .or_insert(0) += 1;
        } else {
            metrics.failure_count += 1;
        }
        let n = metrics.total_requests;
        metrics.average_load_time = running_mean(metrics.average_load_time, n, load_ms);

        let domain = metrics.domain_stats.entry(result.domain.clone()).or_default();
        domain.count += 1;
        domain.avg_load_time = running_mean(domain.avg_load_time, domain.count, load_ms);
        let signal = if result.success { 1.0 } else { 0.0 };
        domain.success_rate = running_mean(domain.success_rate, domain.count, signal);
        if result.success {
            *domain
                .strategy_success
                .entry(result.method.clone())
                .or_insert(0) += 1;
        }

        tracing::debug!(
            method = %result.method,
            domain = %result.domain,
            success = result.success,
            load_ms = load_ms as u64,
            "Recorded extraction attempt"
        );
    }

    /// Snapshot copy of the current metrics.
    pub fn metrics(&self) -> ScrapingMetrics {
        self.lock_inner().clone()
    }

    /// Method with the most successes for `domain`, or the default strategy.
    ///
    /// Advisory only; routing does not consult it.
    pub fn recommend_strategy(&self, domain: &str) -> String {
        let metrics = self.lock_inner();
        metrics
            .domain_stats
            .get(domain)
            .and_then(|stats| {
                stats
                    .strategy_success
                    .iter()
                    // Ties go to the lexicographically first method.
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(method, _)| method.clone())
            })
            .unwrap_or_else(|| self.default_strategy.clone())
    }
}
