use std::fmt::{self, Display};
use std::future::Future;
use std::time::Instant;

use tracing::Instrument;

use crate::metrics::RepositoryMetrics;

// ============================================================================
// Operation Tracing
// ============================================================================
//
// Wraps each public repository operation in a `repository` span carrying
// the collection, the operation and its inputs, then logs the outcome and
// feeds the optional metrics. Repository logic stays free of logging.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upsert,
    Update,
    Save,
    Delete,
    FindOneById,
    FindOneBy,
    FindAll,
    FindBy,
    Transaction,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Upsert => "upsert",
            Operation::Update => "update",
            Operation::Save => "save",
            Operation::Delete => "del",
            Operation::FindOneById => "find_one_by_id",
            Operation::FindOneBy => "find_one_by",
            Operation::FindAll => "find_all",
            Operation::FindBy => "find_by",
            Operation::Transaction => "transaction",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One traced call: where it runs and what it was given.
#[derive(Debug, Clone)]
pub struct Call<'a> {
    pub collection: &'a str,
    pub operation: Operation,
    pub input: Option<String>,
}

impl<'a> Call<'a> {
    pub fn new(collection: &'a str, operation: Operation) -> Self {
        Self {
            collection,
            operation,
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Display) -> Self {
        self.input = Some(input.to_string());
        self
    }
}

pub async fn instrument<Fut, T, E>(
    call: Call<'_>,
    metrics: Option<&RepositoryMetrics>,
    future: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let span = tracing::debug_span!(
        "repository",
        collection = call.collection,
        operation = call.operation.as_str(),
        input = call.input.as_deref().unwrap_or(""),
    );
    let started = Instant::now();

    let result = async {
        tracing::debug!("Operation started");
        let result = future.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(elapsed_ms, "Operation succeeded"),
            Err(error) => tracing::warn!(elapsed_ms, error = %error, "Operation failed"),
        }
        result
    }
    .instrument(span)
    .await;

    if let Some(metrics) = metrics {
        metrics.record_operation(
            call.collection,
            call.operation.as_str(),
            result.is_ok(),
            started.elapsed(),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through_and_records_outcome() {
        let metrics = RepositoryMetrics::new().unwrap();

        let ok: Result<u8, String> = instrument(
            Call::new("people", Operation::FindAll),
            Some(&metrics),
            async { Ok(3) },
        )
        .await;
        let err: Result<u8, String> = instrument(
            Call::new("people", Operation::FindAll).with_input("id=p1"),
            Some(&metrics),
            async { Err("down".to_string()) },
        )
        .await;

        assert_eq!(ok, Ok(3));
        assert_eq!(err, Err("down".to_string()));

        let counter = |outcome: &str| {
            metrics
                .operations_total
                .with_label_values(&["people", "find_all", outcome])
                .get()
        };
        assert_eq!(counter("success"), 1);
        assert_eq!(counter("failure"), 1);
    }

    #[tokio::test]
    async fn test_runs_without_metrics() {
        let result: Result<(), String> =
            instrument(Call::new("people", Operation::Save), None, async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(Operation::Delete.to_string(), "del");
        assert_eq!(Operation::FindOneById.as_str(), "find_one_by_id");
    }
}
