use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::{StoreError, StoreResult};
use super::filter::{document_id, merge_fields, Document, Filter};
use super::write_set::{StagedWrite, WriteSet};
use super::{DocumentStore, StoreSession};

// ============================================================================
// In-Memory Document Store
// ============================================================================
//
// Process-local store with the same semantics the repository expects from
// a real document database:
// - unique `id` per collection
// - sessions whose transactions stage writes and apply them atomically
// - read-your-writes inside a transaction, isolation from other callers
//
// It also counts open sessions (for leak checks) and can fail the next
// call of a given kind on demand.
//
// ============================================================================

/// Store call that an injected fault can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    StartSession,
    StartTransaction,
    Commit,
    Abort,
    EndSession,
    Find,
    Create,
    Update,
    Delete,
}

type Collection = BTreeMap<String, Document>;

#[derive(Debug, Default)]
struct Shared {
    collections: RwLock<HashMap<String, Collection>>,
    faults: Mutex<Vec<Fault>>,
    open_sessions: AtomicUsize,
    sessions_started: AtomicU64,
}

impl Shared {
    /// Consume one pending fault of this kind, if any.
    fn trip(&self, fault: Fault) -> StoreResult<()> {
        let mut faults = lock(&self.faults);
        match faults.iter().position(|pending| *pending == fault) {
            Some(index) => {
                faults.remove(index);
                Err(StoreError::Unavailable(format!("injected {fault:?} fault")))
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of kind `fault` fail with `StoreError::Unavailable`.
    pub fn inject_fault(&self, fault: Fault) {
        lock(&self.shared.faults).push(fault);
    }

    /// Injected faults that have not fired yet.
    pub fn pending_faults(&self) -> usize {
        lock(&self.shared.faults).len()
    }

    /// Sessions started but not yet ended.
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_started(&self) -> u64 {
        self.shared.sessions_started.load(Ordering::SeqCst)
    }

    /// Committed document, bypassing any session.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        read(&self.shared.collections)
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// Number of committed documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        read(&self.shared.collections)
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn visible_documents(&self, collection: &str, staged: Option<&WriteSet>) -> Collection {
        let mut documents = read(&self.shared.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default();
        if let Some(writes) = staged {
            writes.apply_to(collection, &mut documents);
        }
        documents
    }

    fn first_match(
        &self,
        collection: &str,
        filter: &Filter,
        staged: Option<&WriteSet>,
    ) -> Option<Document> {
        let Some(id) = filter.id() else {
            return self
                .visible_documents(collection, staged)
                .into_values()
                .find(|document| filter.matches(document));
        };

        match staged.and_then(|writes| writes.get(collection, id)) {
            Some(StagedWrite::Put(document)) => Some(document.clone()),
            Some(StagedWrite::Delete) => None,
            None => self.document(collection, id),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    in_transaction: bool,
    ended: bool,
    writes: WriteSet,
}

#[derive(Debug)]
pub struct InMemorySession {
    id: u64,
    shared: Arc<Shared>,
    state: Mutex<SessionState>,
}

impl InMemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn in_transaction(&self) -> bool {
        lock(&self.state).in_transaction
    }

    pub fn has_ended(&self) -> bool {
        lock(&self.state).ended
    }
}

/// Lock the session state, rejecting sessions that already ended.
fn open_scope(
    session: Option<&InMemorySession>,
) -> StoreResult<Option<MutexGuard<'_, SessionState>>> {
    let Some(session) = session else {
        return Ok(None);
    };
    let state = lock(&session.state);
    if state.ended {
        return Err(StoreError::SessionEnded);
    }
    Ok(Some(state))
}

fn matching_key(documents: &Collection, filter: &Filter) -> Option<String> {
    match filter.id() {
        Some(id) => documents.contains_key(id).then(|| id.to_string()),
        None => documents
            .iter()
            .find(|(_, document)| filter.matches(document))
            .map(|(id, _)| id.clone()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    type Session = InMemorySession;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&InMemorySession>,
    ) -> StoreResult<Option<Document>> {
        self.shared.trip(Fault::Find)?;
        let scope = open_scope(session)?;
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);
        Ok(self.first_match(collection, filter, staged))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&InMemorySession>,
    ) -> StoreResult<Vec<Document>> {
        self.shared.trip(Fault::Find)?;
        let scope = open_scope(session)?;
        let staged = scope
            .as_deref()
            .filter(|state| state.in_transaction)
            .map(|state| &state.writes);
        Ok(self
            .visible_documents(collection, staged)
            .into_values()
            .filter(|document| filter.matches(document))
            .collect())
    }

    async fn create(
        &self,
        collection: &str,
        document: Document,
        session: Option<&InMemorySession>,
    ) -> StoreResult<()> {
        self.shared.trip(Fault::Create)?;
        let id = document_id(&document)
            .ok_or(StoreError::MissingId)?
            .to_string();
        let mut scope = open_scope(session)?;

        match scope.as_deref_mut() {
            Some(state) if state.in_transaction => {
                let taken = self
                    .first_match(collection, &Filter::by_id(&id), Some(&state.writes))
                    .is_some();
                if taken {
                    return Err(StoreError::duplicate_key(collection, &id));
                }
                state.writes.stage_create(collection, &id, document);
            }
            _ => {
                let mut collections = write(&self.shared.collections);
                let documents = collections.entry(collection.to_string()).or_default();
                if documents.contains_key(&id) {
                    return Err(StoreError::duplicate_key(collection, &id));
                }
                documents.insert(id, document);
            }
        }
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
        session: Option<&InMemorySession>,
    ) -> StoreResult<u64> {
        self.shared.trip(Fault::Update)?;
        let mut scope = open_scope(session)?;

        match scope.as_deref_mut() {
            Some(state) if state.in_transaction => {
                let Some(mut target) = self.first_match(collection, filter, Some(&state.writes))
                else {
                    return Ok(0);
                };
                let id = document_id(&target)
                    .ok_or(StoreError::MissingId)?
                    .to_string();
                merge_fields(&mut target, update);
                state.writes.stage_replace(collection, &id, target);
            }
            _ => {
                let mut collections = write(&self.shared.collections);
                let Some(documents) = collections.get_mut(collection) else {
                    return Ok(0);
                };
                let Some(key) = matching_key(documents, filter) else {
                    return Ok(0);
                };
                if let Some(target) = documents.get_mut(&key) {
                    merge_fields(target, update);
                }
            }
        }
        Ok(1)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&InMemorySession>,
    ) -> StoreResult<u64> {
        self.shared.trip(Fault::Delete)?;
        let mut scope = open_scope(session)?;

        match scope.as_deref_mut() {
            Some(state) if state.in_transaction => {
                let Some(target) = self.first_match(collection, filter, Some(&state.writes)) else {
                    return Ok(0);
                };
                let id = document_id(&target)
                    .ok_or(StoreError::MissingId)?
                    .to_string();
                state.writes.stage_delete(collection, &id);
            }
            _ => {
                let mut collections = write(&self.shared.collections);
                let Some(documents) = collections.get_mut(collection) else {
                    return Ok(0);
                };
                let Some(key) = matching_key(documents, filter) else {
                    return Ok(0);
                };
                documents.remove(&key);
            }
        }
        Ok(1)
    }

    async fn start_session(&self) -> StoreResult<InMemorySession> {
        self.shared.trip(Fault::StartSession)?;
        let id = self.shared.sessions_started.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(session_id = id, "In-memory session started");

        Ok(InMemorySession {
            id,
            shared: Arc::clone(&self.shared),
            state: Mutex::new(SessionState::default()),
        })
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn start_transaction(&self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if state.in_transaction {
            return Err(StoreError::TransactionInProgress);
        }
        self.shared.trip(Fault::StartTransaction)?;

        state.in_transaction = true;
        state.writes.clear();
        Ok(())
    }

    async fn commit_transaction(&self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.shared.trip(Fault::Commit)?;

        let mut collections = write(&self.shared.collections);

        // Inserts staged against an absent id must still find it absent.
        for pending in state.writes.pending() {
            let inserted = matches!(pending.write, StagedWrite::Put(_));
            let exists = collections
                .get(&pending.collection)
                .is_some_and(|documents| documents.contains_key(&pending.id));
            if pending.must_be_absent && inserted && exists {
                return Err(StoreError::duplicate_key(&pending.collection, &pending.id));
            }
        }

        let pending = state.writes.drain();
        let applied = pending.len();
        for staged in pending {
            let documents = collections.entry(staged.collection).or_default();
            match staged.write {
                StagedWrite::Put(document) => {
                    documents.insert(staged.id, document);
                }
                StagedWrite::Delete => {
                    documents.remove(&staged.id);
                }
            }
        }
        state.in_transaction = false;

        tracing::trace!(session_id = self.id, applied, "In-memory transaction committed");
        Ok(())
    }

    async fn abort_transaction(&self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        if state.ended {
            return Err(StoreError::SessionEnded);
        }
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }

        state.writes.clear();
        state.in_transaction = false;
        self.shared.trip(Fault::Abort)
    }

    async fn end_session(&self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        if state.ended {
            return Ok(());
        }

        state.ended = true;
        state.in_transaction = false;
        state.writes.clear();
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);

        tracing::trace!(session_id = self.id, "In-memory session ended");
        self.shared.trip(Fault::EndSession)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Unit Tests
// ============================================================================
