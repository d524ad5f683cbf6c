use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docstore_repository::config::{Backend, StoreConfig};
use docstore_repository::domain::person::{Person, PersonId, PersonRepository};
use docstore_repository::metrics::RepositoryMetrics;
use docstore_repository::persistence::{DocumentStore, RepositoryError};
use docstore_repository::persistence::store::{InMemoryStore, ScyllaStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,docstore_repository=debug")),
        )
        .init();

    tracing::info!("🚀 Starting document repository demo");

    // === 1. Configuration ===
    let config = StoreConfig::from_env()?;
    tracing::info!(backend = ?config.backend, "Loaded store configuration");

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(RepositoryMetrics::new()?);

    // === 3. Store backend ===
    match config.backend {
        Backend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            run(store.clone(), metrics.clone()).await?;
            tracing::info!(open_sessions = store.open_sessions(), "In-memory store drained");
        }
        Backend::Scylla => {
            let store = Arc::new(ScyllaStore::connect(&config.scylla).await?);
            run(store, metrics.clone()).await?;
        }
    }

    // === 4. Metrics snapshot ===
    tracing::info!("📊 Metrics:\n{}", metrics.render()?);

    tracing::info!("✅ Demo finished");
    Ok(())
}

async fn run<S: DocumentStore>(store: Arc<S>, metrics: Arc<RepositoryMetrics>) -> anyhow::Result<()> {
    let people = PersonRepository::new(store).with_metrics(metrics);
    let id = PersonId::generate();

    // Save, then upsert under the same id
    people.save(&Person::new(id.clone(), "Alice")).await?;
    let all = people.find_all().await?;
    tracing::info!(count = all.len(), "Stored people");

    people
        .upsert(&Person::new(id.clone(), "Alicia").with_document("12345678901"))
        .await?;
    match people.find(&id).await? {
        Some(person) => tracing::info!(
            id = %person.id,
            name = %person.name,
            created_at = ?person.created_at,
            updated_at = ?person.updated_at,
            "Person after upsert"
        ),
        None => anyhow::bail!("person {id} vanished after upsert"),
    }

    if let Some(person) = people.find_by_document("12345678901").await? {
        tracing::info!(id = %person.id, "Found person by document");
    }

    // A unit of work that fails leaves nothing behind
    let bob = PersonId::generate();
    let outcome: Result<(), anyhow::Error> = people
        .transaction(|tx| {
            let bob = bob.clone();
            async move {
                tx.upsert(&Person::new(bob, "Bob")).await?;
                anyhow::bail!("payment declined")
            }
        })
        .await;
    if let Err(err) = outcome {
        tracing::warn!(error = %err, "Transaction rolled back");
    }
    tracing::info!(present = people.find(&bob).await?.is_some(), "Bob after rollback");

    // A unit of work that succeeds commits every write
    people
        .transaction(|tx| async move {
            tx.upsert(&Person::new(PersonId::generate(), "Carol")).await?;
            tx.upsert(&Person::new(PersonId::generate(), "Dave")).await?;
            Ok::<_, RepositoryError>(())
        })
        .await?;
    tracing::info!(count = people.find_all().await?.len(), "Stored people after commit");

    // Clean up
    for person in people.find_all().await? {
        people.del(&person).await?;
    }

    Ok(())
}
