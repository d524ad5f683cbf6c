use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::Batch;
use scylla::value::{CqlValue, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::filter::{document_id, merge_fields, Document, Filter};
use super::write_set::{StagedWrite, WriteSet};
use super::{DocumentStore, StoreSession};
use crate::config::ScyllaConfig;
use crate::utils::retry_with_backoff;

// ============================================================================
// ScyllaDB Document Store
// ============================================================================
//
// Documents live in one table, partitioned by collection:
//
//   documents (collection text, id text, body text,
//              PRIMARY KEY ((collection), id))
//
// `body` is the JSON-encoded document. Inserts outside a transaction use
// a lightweight transaction (IF NOT EXISTS) so a taken id is rejected by
// the database itself. Sessions stage their writes client-side and commit
// them as one LOGGED batch: either all staged writes land or none do.
//
// ============================================================================

const CREATE_TABLE_CQL: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection text,
    id text,
    body text,
    PRIMARY KEY ((collection), id)
)";
const SELECT_ONE_CQL: &str = "SELECT body FROM documents WHERE collection = ? AND id = ?";
const SELECT_ALL_CQL: &str = "SELECT body FROM documents WHERE collection = ?";
const INSERT_IF_ABSENT_CQL: &str =
    "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?) IF NOT EXISTS";
const UPSERT_CQL: &str = "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)";
const DELETE_CQL: &str = "DELETE FROM documents WHERE collection = ? AND id = ?";

#[derive(Clone)]
pub struct ScyllaStore {
    client: Arc<Session>,
}

impl ScyllaStore {
    /// Wrap an already connected session whose keyspace holds `documents`.
    pub fn new(client: Arc<Session>) -> Self {
        Self { client }
    }

    /// Connect, then make sure the keyspace and table exist.
    pub async fn connect(config: &ScyllaConfig) -> StoreResult<Self> {
        tracing::info!(nodes = ?config.known_nodes, keyspace = %config.keyspace, "Connecting to ScyllaDB...");

        let client = retry_with_backoff(&config.connect_retry, |attempt| {
            let nodes = config.known_nodes.clone();
            async move {
                tracing::debug!(attempt, "Opening ScyllaDB session");
                let mut builder = SessionBuilder::new();
                for node in &nodes {
                    builder = builder.known_node(node);
                }
                builder.build().await
            }
        })
        .await
        .map_err(StoreError::backend)?;

        client
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
                    config.keyspace, config.replication_factor
                ),
                (),
            )
            .await
            .map_err(StoreError::backend)?;

        client
            .use_keyspace(config.keyspace.as_str(), false)
            .await
            .map_err(StoreError::backend)?;

        client
            .query_unpaged(CREATE_TABLE_CQL, ())
            .await
            .map_err(StoreError::backend)?;

        tracing::info!(keyspace = %config.keyspace, "✅ ScyllaDB document store ready");
        Ok(Self::new(Arc::new(client)))
    }

    async fn load(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let result = self
            .client
            .query_unpaged(SELECT_ONE_CQL, (collection, id))
            .await
            .map_err(StoreError::backend)?;

        // A SELECT always answers with a rows result, even when empty.
        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;

        match rows_result
            .maybe_first_row::<(String,)>()
            .map_err(StoreError::backend)?
        {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn load_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let result = self
            .client
            .query_unpaged(SELECT_ALL_CQL, (collection,))
            .await
            .map_err(StoreError::backend)?;

        let mut documents = Vec::new();
        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;

        for row in rows_result
            .rows::<(String,)>()
            .map_err(StoreError::backend)?
        {
            let (body,) = row.map_err(StoreError::backend)?;
            documents.push(serde_json::from_str(&body)?);
        }

        tracing::trace!(collection, count = documents.len(), "Loaded documents");
        Ok(documents)
    }

    /// Insert guarded by IF NOT EXISTS. Returns whether the row was written.
    async fn insert_if_absent(&self, collection: &str, id: &str, body: String) -> StoreResult<bool> {
        let result = self
            .client
            .query_unpaged(INSERT_IF_ABSENT_CQL, (collection, id, body))
            .await
            .map_err(StoreError::backend)?;

        // LWT results lead with the `[applied]` column.
        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let applied = rows_result
            .maybe_first_row::<Row>()
            .map_err(StoreError::backend)?
            .and_then(|row| row.columns.into_iter().next().flatten());

        Ok(matches!(applied, Some(CqlValue::Boolean(true))))
    }

    async fn overwrite(&self, collection: &str, id: &str, document: &Document) -> StoreResult<()> {
        let body = serde_json::to_string(document)?;
        self.client
            .query_unpaged(UPSERT_CQL, (collection, id, body))
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.client
            .query_unpaged(DELETE_CQL, (collection, id))
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    /// Documents matching `filter`, with staged writes layered on top.
    async fn matching(
        &self,
        collection: &str,
        filter: &Filter,
        staged: Option<&WriteSet>,
    ) -> StoreResult<Vec<Document>> {
        if let Some(id) = filter.id() {
            let document = match staged.and_then(|writes| writes.get(collection, id)) {
                Some(StagedWrite::Put(document)) => Some(document.clone()),
                Some(StagedWrite::Delete) => None,
                None => self.load(collection, id).await?,
            };
            return Ok(document.into_iter().collect());
        }

        let mut documents = index_by_id(self.load_all(collection).await?)?;

        if let Some(writes) = staged {
            writes.apply_to(collection, &mut documents);
        }

        Ok(documents
            .into_values()
            .filter(|document| filter.matches(document))
            .collect())
    }
}

/// Key stored bodies by their `id`. A body without one is corrupt.
fn index_by_id(documents: Vec<Document>) -> StoreResult<BTreeMap<String, Document>> {
    documents
        .into_iter()
        .map(|document| {
            let id = document_id(&document).ok_or(StoreError::MissingId)?.to_string();
            Ok((id, document))
        })
        .collect()
}

#[derive(Debug, Default)]
struct SessionState {
    in_transaction: bool,
    ended: bool,
    writes: WriteSet,
}

/// Client-side session: staged writes are flushed as one logged batch.
pub struct ScyllaSession {
    id: Uuid,
    client: Arc<Session>,
    state: Mutex<SessionState>,
}

impl ScyllaSession {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

async fn open_scope(
    session: Option<&ScyllaSession>,
) -> StoreResult<Option<MutexGuard<'_, SessionState>>> {
    let Some(session) = session else {
        return Ok(None);
    };
    let state = session.state.lock().await;
    if state.ended {
        return Err(StoreError::SessionEnded);
    }
    Ok(Some(state))
}

#[async_trait]
impl DocumentStore for ScyllaStore {
    type Session = ScyllaSession;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&ScyllaSession>,
    ) -> StoreResult<Option<Document>> {
        let scope = open_scope(session).await?;
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);
        Ok(self
            .matching(collection, filter, staged)
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&ScyllaSession>,
    ) -> StoreResult<Vec<Document>> {
        let scope = open_scope(session).await?;
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);
        self.matching(collection, filter, staged).await
    }

    async fn create(
        &self,
        collection: &str,
        document: Document,
        session: Option<&ScyllaSession>,
    ) -> StoreResult<()> {
        let id = document_id(&document)
            .ok_or(StoreError::MissingId)?
            .to_string();
        let mut scope = open_scope(session).await?;

        match scope.as_deref_mut() {
            Some(state) if state.in_transaction => {
                let taken = !self
                    .matching(collection, &Filter::by_id(&id), Some(&state.writes))
                    .await?
                    .is_empty();
                if taken {
                    return Err(StoreError::duplicate_key(collection, &id));
                }
                state.writes.stage_create(collection, &id, document);
            }
            _ => {
                let body = serde_json::to_string(&document)?;
                if !self.insert_if_absent(collection, &id, body).await? {
                    return Err(StoreError::duplicate_key(collection, &id));
                }
            }
        }
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
        session: Option<&ScyllaSession>,
    ) -> StoreResult<u64> {
        let mut scope = open_scope(session).await?;
        let in_transaction = scope.as_deref().is_some_and(|state| state.in_transaction);
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);

        let Some(mut target) = self
            .matching(collection, filter, staged)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(0);
        };
        let id = document_id(&target)
            .ok_or(StoreError::MissingId)?
            .to_string();
        merge_fields(&mut target, update);

        match scope.as_deref_mut() {
            Some(state) if in_transaction => state.writes.stage_replace(collection, &id, target),
            _ => self.overwrite(collection, &id, &target).await?,
        }
        Ok(1)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&ScyllaSession>,
    ) -> StoreResult<u64> {
        let mut scope = open_scope(session).await?;
        let in_transaction = scope.as_deref().is_some_and(|state| state.in_transaction);
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);

        let Some(target) = self
            .matching(collection, filter, staged)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(0);
        };
        let id = document_id(&target)
            .ok_or(StoreError::MissingId)?
            .to_string();

        match scope.as_deref_mut() {
            Some(state) if in_transaction => state.writes.stage_delete(collection, &id),
            _ => self.remove(collection, &id).await?,
        }
        Ok(1)
    }

    async fn start_session(&self) -> StoreResult<ScyllaSession> {
        let id = Uuid::new_v4();
        tracing::debug!(session_id = %id, "ScyllaDB session opened");

        Ok(ScyllaSession {
            id,
            client: Arc::clone(&self.client),
            state: Mutex::new(SessionState::default()),
        })
    }
}

#[async_trait]
impl StoreSession for ScyllaSession {
    async fn start_transaction(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if state.in_transaction {
            return Err(StoreError::TransactionInProgress);
        }
        state.in_transaction = true;
        state.writes.clear();
        Ok(())
    }

    async fn commit_transaction(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }

        let pending = state.writes.pending();
        if pending.is_empty() {
            state.in_transaction = false;
            return Ok(());
        }

        let store = ScyllaStore::new(Arc::clone(&self.client));
        for write in pending.iter().filter(|write| write.must_be_absent) {
            if matches!(write.write, StagedWrite::Put(_))
                && store.load(&write.collection, &write.id).await?.is_some()
            {
                return Err(StoreError::duplicate_key(&write.collection, &write.id));
            }
        }

        // Prepare batch for atomic write
        let mut batch = Batch::default();
        let mut values: Vec<Box<dyn SerializeRow + Send + Sync>> = Vec::with_capacity(pending.len());

        for write in pending {
            match write.write {
                StagedWrite::Put(document) => {
                    batch.append_statement(UPSERT_CQL);
                    let body = serde_json::to_string(&document)?;
                    values.push(Box::new((write.collection, write.id, body)));
                }
                StagedWrite::Delete => {
                    batch.append_statement(DELETE_CQL);
                    values.push(Box::new((write.collection, write.id)));
                }
            }
        }

        let statements = values.len();
        self.client
            .batch(&batch, values)
            .await
            .map_err(StoreError::backend)?;

        state.writes.clear();
        state.in_transaction = false;

        tracing::debug!(session_id = %self.id, statements, "✅ Committed staged writes");
        Ok(())
    }

    async fn abort_transaction(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        state.writes.clear();
        state.in_transaction = false;
        Ok(())
    }

    async fn end_session(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.ended {
            state.ended = true;
            state.in_transaction = false;
            state.writes.clear();
            tracing::debug!(session_id = %self.id, "ScyllaDB session ended");
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Statements against a live cluster are exercised by running the binary
// with DOCSTORE_BACKEND=scylla. These tests cover the pure parts.
//
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_target_documents_table() {
        for cql in [SELECT_ONE_CQL, SELECT_ALL_CQL, INSERT_IF_ABSENT_CQL, UPSERT_CQL, DELETE_CQL] {
            assert!(cql.contains("documents"), "{cql}");
        }
        assert!(INSERT_IF_ABSENT_CQL.ends_with("IF NOT EXISTS"));
        assert!(CREATE_TABLE_CQL.contains("PRIMARY KEY ((collection), id)"));
    }

    #[test]
    fn test_point_reads_bind_partition_and_clustering_key() {
        assert_eq!(SELECT_ONE_CQL.matches('?').count(), 2);
        assert_eq!(DELETE_CQL.matches('?').count(), 2);
        assert_eq!(UPSERT_CQL.matches('?').count(), 3);
    }

    fn body(raw: serde_json::Value) -> Document {
        let serde_json::Value::Object(document) = raw else {
            unreachable!()
        };
        document
    }

    #[test]
    fn test_index_by_id_keys_documents() {
        let indexed = index_by_id(vec![
            body(serde_json::json!({"id": "p2", "name": "Bob"})),
            body(serde_json::json!({"id": "p1", "name": "Alice"})),
        ])
        .unwrap();

        assert_eq!(indexed.keys().collect::<Vec<_>>(), ["p1", "p2"]);
    }

    #[test]
    fn test_body_without_id_is_an_error_not_skipped() {
        let err = index_by_id(vec![
            body(serde_json::json!({"id": "p1", "name": "Alice"})),
            body(serde_json::json!({"name": "nobody"})),
        ])
        .unwrap_err();

        assert!(matches!(err, StoreError::MissingId));
    }
}
