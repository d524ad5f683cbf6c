// ============================================================================
// Document Repository - Generic Aggregate Persistence
// ============================================================================
//
// `DocumentRepository<M, S>` stores the aggregates of one mapper `M` in one
// collection of a document store `S`. It owns the write rules:
// - `validate()` runs before any write, and a failure performs no I/O
// - inserts fill `createdAt`/`updatedAt` when the model leaves them unset,
//   and never store an `updatedAt` earlier than `createdAt`
// - updates never carry `id` or `createdAt`, and always move `updatedAt`
//   forward
//
// Upsert is a read followed by a write. Outside a transaction two
// concurrent upserts of the same id race and the last writer wins.
//
// Transactions hand the unit of work a clone of the repository bound to a
// fresh store session; see `session` for the lifecycle.
//
// ============================================================================

pub mod error;
pub mod session;
pub mod trace;


use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

pub use error::{RepositoryError, RepositoryResult};
pub use session::{InvalidTransition, SessionLifecycle, SessionState};
pub use trace::{Call, Operation};

use crate::metrics::RepositoryMetrics;
use crate::persistence::core::{
    next_update_timestamp, Aggregate, Clock, Mapper, MappingError, SystemClock,
    CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::persistence::store::{document_id, Document, DocumentStore, Filter, StoreError};

type AggregateOf<M> = <M as Mapper>::Aggregate;
type IdOf<M> = <<M as Mapper>::Aggregate as Aggregate>::Id;

pub struct DocumentRepository<M, S: DocumentStore> {
    store: Arc<S>,
    mapper: Arc<M>,
    clock: Arc<dyn Clock>,
    collection: Arc<str>,
    metrics: Option<Arc<RepositoryMetrics>>,
    session: Option<Arc<S::Session>>,
}

impl<M, S: DocumentStore> Clone for DocumentRepository<M, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mapper: Arc::clone(&self.mapper),
            clock: Arc::clone(&self.clock),
            collection: Arc::clone(&self.collection),
            metrics: self.metrics.clone(),
            session: self.session.clone(),
        }
    }
}

impl<M, S> DocumentRepository<M, S>
where
    M: Mapper,
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, mapper: M, collection: impl Into<String>) -> Self {
        Self {
            store,
            mapper: Arc::new(mapper),
            clock: Arc::new(SystemClock),
            collection: Arc::from(collection.into()),
            metrics: None,
            session: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RepositoryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// True for the handle given to a unit of work.
    pub fn in_transaction(&self) -> bool {
        self.session.is_some()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert the aggregate, or update the stored record with the same id.
    pub async fn upsert(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        let call = self.call(Operation::Upsert).with_input(aggregate.id());
        trace::instrument(call, self.metrics(), self.upsert_document(aggregate)).await
    }

    /// Update the stored record with the aggregate's id. Does nothing when
    /// there is no such record.
    pub async fn update(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        let call = self.call(Operation::Update).with_input(aggregate.id());
        trace::instrument(call, self.metrics(), self.update_existing(aggregate)).await
    }

    /// Insert without checking for an existing record.
    ///
    /// A taken id fails with `StoreError::DuplicateKey`.
    pub async fn save(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        let call = self.call(Operation::Save).with_input(aggregate.id());
        trace::instrument(call, self.metrics(), async {
            aggregate.validate().map_err(RepositoryError::validation)?;
            let document = self.encode(aggregate)?;
            self.insert(document).await
        })
        .await
    }

    /// Remove the aggregate's record. Removing a missing record is not an error.
    pub async fn del(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        let call = self.call(Operation::Delete).with_input(aggregate.id());
        trace::instrument(call, self.metrics(), async {
            self.store
                .delete_one(&self.collection, &Filter::by_id(aggregate.id()), self.session())
                .await?;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn find_one_by_id(&self, id: &IdOf<M>) -> RepositoryResult<Option<AggregateOf<M>>> {
        let call = self.call(Operation::FindOneById).with_input(id);
        trace::instrument(call, self.metrics(), self.find_one_matching(Filter::by_id(id))).await
    }

    /// First aggregate whose record matches `filter`.
    pub async fn find_one_by(&self, filter: Filter) -> RepositoryResult<Option<AggregateOf<M>>> {
        let call = self.call(Operation::FindOneBy).with_input(&filter);
        trace::instrument(call, self.metrics(), self.find_one_matching(filter)).await
    }

    pub async fn find_all(&self) -> RepositoryResult<Vec<AggregateOf<M>>> {
        let call = self.call(Operation::FindAll);
        trace::instrument(call, self.metrics(), self.find_matching(Filter::all())).await
    }

    pub async fn find_by(&self, filter: Filter) -> RepositoryResult<Vec<AggregateOf<M>>> {
        let call = self.call(Operation::FindBy).with_input(&filter);
        trace::instrument(call, self.metrics(), self.find_matching(filter)).await
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `work` inside one store transaction.
    ///
    /// `work` receives a repository bound to the session; everything done
    /// through it commits or aborts together. An error returned by `work`
    /// comes back unchanged after the abort.
    pub async fn transaction<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RepositoryError> + Display,
    {
        let call = self.call(Operation::Transaction);
        trace::instrument(call, self.metrics(), self.run_transaction(work)).await
    }

    async fn run_transaction<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RepositoryError> + Display,
    {
        if self.in_transaction() {
            return Err(RepositoryError::NestedTransaction.into());
        }

        let session = Arc::new(
            self.store
                .start_session()
                .await
                .map_err(RepositoryError::from)?,
        );
        let bound = Self {
            session: Some(Arc::clone(&session)),
            ..self.clone()
        };

        let mut lifecycle = SessionLifecycle::new();
        let result = session::run(session.as_ref(), &mut lifecycle, work(bound)).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_transaction(&self.collection, lifecycle.committed());
        }
        result
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn call(&self, operation: Operation) -> Call<'_> {
        Call::new(&self.collection, operation)
    }

    fn metrics(&self) -> Option<&RepositoryMetrics> {
        self.metrics.as_deref()
    }

    fn session(&self) -> Option<&S::Session> {
        self.session.as_deref()
    }

    async fn upsert_document(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        aggregate.validate().map_err(RepositoryError::validation)?;

        let id = aggregate.id().to_string();
        let existing = self
            .store
            .find_one(&self.collection, &Filter::by_id(&id), self.session())
            .await?;
        let document = self.encode(aggregate)?;

        match existing {
            Some(stored) => self.overwrite(&id, document, &stored).await,
            None => self.insert(document).await,
        }
    }

    async fn update_existing(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<()> {
        aggregate.validate().map_err(RepositoryError::validation)?;

        let id = aggregate.id().to_string();
        let existing = self
            .store
            .find_one(&self.collection, &Filter::by_id(&id), self.session())
            .await?;

        match existing {
            Some(stored) => {
                let document = self.encode(aggregate)?;
                self.overwrite(&id, document, &stored).await
            }
            None => Ok(()),
        }
    }

    async fn insert(&self, mut document: Document) -> RepositoryResult<()> {
        let now = self.clock.now();
        stamp_if_unset(&mut document, CREATED_AT_FIELD, now)?;
        stamp_if_unset(&mut document, UPDATED_AT_FIELD, now)?;

        // A record is never updated before it was created.
        let created_at = stored_timestamp(&document, CREATED_AT_FIELD);
        let updated_at = stored_timestamp(&document, UPDATED_AT_FIELD);
        if let (Some(created_at), Some(updated_at)) = (created_at, updated_at) {
            if updated_at < created_at {
                document.insert(UPDATED_AT_FIELD.to_string(), serde_json::to_value(created_at)?);
            }
        }

        self.store
            .create(&self.collection, document, self.session())
            .await?;
        Ok(())
    }

    async fn overwrite(&self, id: &str, mut document: Document, stored: &Document) -> RepositoryResult<()> {
        document.remove(ID_FIELD);
        document.remove(CREATED_AT_FIELD);

        let updated_at = next_update_timestamp(self.clock.now(), stored_timestamp(stored, UPDATED_AT_FIELD));
        document.insert(UPDATED_AT_FIELD.to_string(), serde_json::to_value(updated_at)?);

        self.store
            .update_one(&self.collection, &Filter::by_id(id), document, self.session())
            .await?;
        Ok(())
    }

    async fn find_one_matching(&self, filter: Filter) -> RepositoryResult<Option<AggregateOf<M>>> {
        let document = self
            .store
            .find_one(&self.collection, &filter, self.session())
            .await?;
        document.map(|document| self.decode(document)).transpose()
    }

    async fn find_matching(&self, filter: Filter) -> RepositoryResult<Vec<AggregateOf<M>>> {
        self.store
            .find(&self.collection, &filter, self.session())
            .await?
            .into_iter()
            .map(|document| self.decode(document))
            .collect()
    }

    fn encode(&self, aggregate: &AggregateOf<M>) -> RepositoryResult<Document> {
        let model = self.mapper.to_persistence(aggregate);
        match serde_json::to_value(&model)? {
            Value::Object(document) => Ok(document),
            _ => Err(MappingError::NotADocument.into()),
        }
    }

    fn decode(&self, document: Document) -> RepositoryResult<AggregateOf<M>> {
        let id = document_id(&document).unwrap_or_default().to_string();
        let model = serde_json::from_value(Value::Object(document))
            .map_err(|source| MappingError::Malformed { id, source })?;
        Ok(self.mapper.to_domain(model)?)
    }
}

impl<M, S: DocumentStore> std::fmt::Debug for DocumentRepository<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("collection", &self.collection)
            .field("in_transaction", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

fn stamp_if_unset(document: &mut Document, field: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
    if matches!(document.get(field), None | Some(Value::Null)) {
        document.insert(field.to_string(), serde_json::to_value(at)?);
    }
    Ok(())
}

fn stored_timestamp(document: &Document, field: &str) -> Option<DateTime<Utc>> {
    document
        .get(field)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}
