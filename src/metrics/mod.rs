use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

// ============================================================================
// Prometheus Metrics for Repositories
// ============================================================================
//
// Exposed metrics:
// - repository_operations_total{collection, operation, outcome}
// - repository_operation_duration_seconds{collection, operation}
// - repository_transactions_total{collection, outcome}
//
// One `RepositoryMetrics` can be shared by every repository of a process;
// the `collection` label tells them apart.
//
// ============================================================================

#[derive(Clone)]
pub struct RepositoryMetrics {
    registry: Registry,

    pub operations_total: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub transactions_total: IntCounterVec,
}

impl RepositoryMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the repository metrics on an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let operations_total = IntCounterVec::new(
            Opts::new(
                "repository_operations_total",
                "Total repository operations by outcome",
            ),
            &["collection", "operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "repository_operation_duration_seconds",
                "Time spent in repository operations",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["collection", "operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "repository_transactions_total",
                "Transactions run through repositories by outcome",
            ),
            &["collection", "outcome"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration,
            transactions_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record one finished repository operation
    pub fn record_operation(&self, collection: &str, operation: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.operations_total
            .with_label_values(&[collection, operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[collection, operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Helper to record how a transaction ended
    pub fn record_transaction(&self, collection: &str, committed: bool) {
        let outcome = if committed { "committed" } else { "aborted" };
        self.transactions_total
            .with_label_values(&[collection, outcome])
            .inc();
    }

    /// Text exposition format of everything in the registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for RepositoryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryMetrics").finish_non_exhaustive()
    }
}
