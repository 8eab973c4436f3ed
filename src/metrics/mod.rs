use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::domain::order::OrderError;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order ingestion throughput and failures per workflow stage
// - Repository call outcomes and latency per operation
//
// All metrics are registered with one Registry and scraped via /metrics on the
// main HTTP server.
// ============================================================================

/// Central metrics registry for the service
pub struct Metrics {
    registry: Registry,

    // Ingestion Metrics
    pub orders_ingested: IntCounter,
    pub ingestion_failures: IntCounterVec,

    // Repository Metrics
    pub repository_operations: IntCounterVec,
    pub repository_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Ingestion Metrics
        let orders_ingested = IntCounter::new(
            "orders_ingested_total",
            "Total orders persisted from the order queue",
        )?;
        registry.register(Box::new(orders_ingested.clone()))?;

        let ingestion_failures = IntCounterVec::new(
            Opts::new("ingestion_failures_total", "Ingestion runs aborted, by failing stage"),
            &["stage"],
        )?;
        registry.register(Box::new(ingestion_failures.clone()))?;

        // Repository Metrics
        let repository_operations = IntCounterVec::new(
            Opts::new("repository_operations_total", "Total repository calls by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(repository_operations.clone()))?;

        let repository_duration = HistogramVec::new(
            HistogramOpts::new("repository_operation_duration_seconds", "Repository call duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["operation"],
        )?;
        registry.register(Box::new(repository_duration.clone()))?;

        Ok(Self {
            registry,
            orders_ingested,
            ingestion_failures,
            repository_operations,
            repository_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, OrderError> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| OrderError::persistence("encode metrics", e))
    }

    /// Helper to record a repository call
    pub fn record_repository_call(&self, operation: &str, duration_secs: f64, outcome: &str) {
        self.repository_operations.with_label_values(&[operation, outcome]).inc();
        self.repository_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    /// Helper to record an aborted ingestion run
    pub fn record_ingestion_failure(&self, stage: &str) {
        self.ingestion_failures.with_label_values(&[stage]).inc();
    }
}

/// Outcome label for a repository result
pub fn outcome<T>(result: &Result<T, OrderError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(OrderError::NotFound(_)) => "not_found",
        Err(_) => "error",
    }
}
