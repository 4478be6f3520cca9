// Performance metrics for the pricing engine
//
// Tracks pricing and catalog timings, cache hit rates, and the degraded paths
// (catalog outages, evaluation errors, forced corrections, audit failures).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default threshold for slow operations (100ms)
pub const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Performance metrics for the pricing engine
#[derive(Debug, Clone)]
pub struct PricingMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    slow_threshold: Duration,

    // Cache metrics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,

    // Operation counts and timing (in microseconds)
    pricing_calculations: AtomicU64,
    total_pricing_time_us: AtomicU64,
    slow_pricing_calculations: AtomicU64,
    catalog_fetches: AtomicU64,
    total_catalog_time_us: AtomicU64,
    slow_catalog_fetches: AtomicU64,

    // Degraded paths
    catalog_outages: AtomicU64,
    unavailable_sources: AtomicU64,
    invalid_rules: AtomicU64,
    evaluation_errors: AtomicU64,
    forced_corrections: AtomicU64,
    audit_failures: AtomicU64,
}

impl PricingMetrics {
    /// Create a new PricingMetrics instance with the default slow threshold
    pub fn new() -> Self {
        Self::with_slow_threshold(Duration::from_millis(SLOW_OPERATION_THRESHOLD_MS))
    }

    pub fn with_slow_threshold(slow_threshold: Duration) -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                slow_threshold,
                cache_hits: AtomicU64::new(0),
                cache_misses: AtomicU64::new(0),
                pricing_calculations: AtomicU64::new(0),
                total_pricing_time_us: AtomicU64::new(0),
                slow_pricing_calculations: AtomicU64::new(0),
                catalog_fetches: AtomicU64::new(0),
                total_catalog_time_us: AtomicU64::new(0),
                slow_catalog_fetches: AtomicU64::new(0),
                catalog_outages: AtomicU64::new(0),
                unavailable_sources: AtomicU64::new(0),
                invalid_rules: AtomicU64::new(0),
                evaluation_errors: AtomicU64::new(0),
                forced_corrections: AtomicU64::new(0),
                audit_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_catalog_outage(&self) {
        self.inner.catalog_outages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable_source(&self) {
        self.inner.unavailable_sources.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_rule(&self) {
        self.inner.invalid_rules.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_error(&self) {
        self.inner.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_correction(&self) {
        self.inner.forced_corrections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.inner.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Start timing a pricing calculation
    pub fn start_pricing_calculation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Pricing, self.clone())
    }

    /// Start timing a catalog fetch
    pub fn start_catalog_fetch(&self) -> OperationTimer {
        OperationTimer::new(OperationType::CatalogFetch, self.clone())
    }

    fn record_operation(&self, operation_type: OperationType, duration: Duration) {
        let (count, total, slow) = match operation_type {
            OperationType::Pricing => (
                &self.inner.pricing_calculations,
                &self.inner.total_pricing_time_us,
                &self.inner.slow_pricing_calculations,
            ),
            OperationType::CatalogFetch => (
                &self.inner.catalog_fetches,
                &self.inner.total_catalog_time_us,
                &self.inner.slow_catalog_fetches,
            ),
        };

        count.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration > self.inner.slow_threshold {
            slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Slow {}: {}ms",
                operation_type.label(),
                duration.as_millis()
            );
        }
    }

    fn avg_ms(count: &AtomicU64, total_us: &AtomicU64) -> f64 {
        let count = count.load(Ordering::Relaxed);
        let total_us = total_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    /// Get average pricing calculation time in milliseconds
    pub fn avg_pricing_time_ms(&self) -> f64 {
        Self::avg_ms(&self.inner.pricing_calculations, &self.inner.total_pricing_time_us)
    }

    /// Get average catalog fetch time in milliseconds
    pub fn avg_catalog_time_ms(&self) -> f64 {
        Self::avg_ms(&self.inner.catalog_fetches, &self.inner.total_catalog_time_us)
    }

    /// Get metrics summary
    pub fn summary(&self) -> MetricsSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSummary {
            cache_hit_rate: self.cache_hit_rate(),
            cache_hits: load(&self.inner.cache_hits),
            cache_misses: load(&self.inner.cache_misses),
            pricing_calculations: load(&self.inner.pricing_calculations),
            avg_pricing_time_ms: self.avg_pricing_time_ms(),
            slow_pricing_calculations: load(&self.inner.slow_pricing_calculations),
            catalog_fetches: load(&self.inner.catalog_fetches),
            avg_catalog_time_ms: self.avg_catalog_time_ms(),
            slow_catalog_fetches: load(&self.inner.slow_catalog_fetches),
            catalog_outages: load(&self.inner.catalog_outages),
            unavailable_sources: load(&self.inner.unavailable_sources),
            invalid_rules: load(&self.inner.invalid_rules),
            evaluation_errors: load(&self.inner.evaluation_errors),
            forced_corrections: load(&self.inner.forced_corrections),
            audit_failures: load(&self.inner.audit_failures),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Pricing Engine Metrics:\n\
             Cache: {:.1}% hit rate ({} hits, {} misses)\n\
             Pricing: {} calculations, avg {:.2}ms, {} slow\n\
             Catalog: {} fetches, avg {:.2}ms, {} slow, {} outages, {} unavailable sources, {} invalid rules\n\
             Degraded: {} evaluation errors, {} forced corrections, {} audit failures",
            summary.cache_hit_rate * 100.0,
            summary.cache_hits,
            summary.cache_misses,
            summary.pricing_calculations,
            summary.avg_pricing_time_ms,
            summary.slow_pricing_calculations,
            summary.catalog_fetches,
            summary.avg_catalog_time_ms,
            summary.slow_catalog_fetches,
            summary.catalog_outages,
            summary.unavailable_sources,
            summary.invalid_rules,
            summary.evaluation_errors,
            summary.forced_corrections,
            summary.audit_failures,
        );
    }
}

impl Default for PricingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of operation being timed
#[derive(Debug, Clone, Copy)]
enum OperationType {
    Pricing,
    CatalogFetch,
}

impl OperationType {
    fn label(self) -> &'static str {
        match self {
            OperationType::Pricing => "pricing calculation",
            OperationType::CatalogFetch => "catalog fetch",
        }
    }
}

/// Timer for tracking operation duration
///
/// Records once, when dropped.
pub struct OperationTimer {
    start: Instant,
    operation_type: OperationType,
    metrics: PricingMetrics,
}

impl OperationTimer {
    fn new(operation_type: OperationType, metrics: PricingMetrics) -> Self {
        Self {
            start: Instant::now(),
            operation_type,
            metrics,
        }
    }

    /// Complete the timer and record the duration
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.metrics.record_operation(self.operation_type, duration);
    }
}

/// Summary of pricing metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cache_hit_rate: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub pricing_calculations: u64,
    pub avg_pricing_time_ms: f64,
    pub slow_pricing_calculations: u64,
    pub catalog_fetches: u64,
    pub avg_catalog_time_ms: f64,
    pub slow_catalog_fetches: u64,
    pub catalog_outages: u64,
    pub unavailable_sources: u64,
    pub invalid_rules: u64,
    pub evaluation_errors: u64,
    pub forced_corrections: u64,
    pub audit_failures: u64,
}
