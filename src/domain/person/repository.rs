use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use super::aggregate::{Person, PersonId};
use super::mapper::PersonMapper;
use crate::metrics::RepositoryMetrics;
use crate::persistence::core::Clock;
use crate::persistence::repository::{DocumentRepository, RepositoryError, RepositoryResult};
use crate::persistence::store::{DocumentStore, Filter};

pub const PERSON_COLLECTION: &str = "person";

// ============================================================================
// Person Repository
// ============================================================================
//
// Composition over the generic repository: every generic operation is
// reachable through `Deref`, and the person-specific lookups are added
// on top.
//
// ============================================================================

pub struct PersonRepository<S: DocumentStore> {
    inner: DocumentRepository<PersonMapper, S>,
}

impl<S: DocumentStore> Clone for PersonRepository<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: DocumentStore> PersonRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            inner: DocumentRepository::new(store, PersonMapper, PERSON_COLLECTION),
        }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: self.inner.with_clock(clock),
        }
    }

    pub fn with_metrics(self, metrics: Arc<RepositoryMetrics>) -> Self {
        Self {
            inner: self.inner.with_metrics(metrics),
        }
    }

    /// The person holding the given tax document number, if any.
    pub async fn find_by_document(&self, document: &str) -> RepositoryResult<Option<Person>> {
        self.inner.find_one_by(Filter::field_eq("document", document)).await
    }

    pub async fn list_by_name(&self, name: &str) -> RepositoryResult<Vec<Person>> {
        self.inner.find_by(Filter::field_eq("name", name)).await
    }

    pub async fn find(&self, id: &PersonId) -> RepositoryResult<Option<Person>> {
        self.inner.find_one_by_id(id).await
    }

    /// Same as [`DocumentRepository::transaction`], handing the unit of
    /// work a `PersonRepository` bound to the session.
    pub async fn transaction<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(PersonRepository<S>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RepositoryError> + Display,
    {
        self.inner
            .transaction(|inner| work(PersonRepository { inner }))
            .await
    }
}

impl<S: DocumentStore> std::ops::Deref for PersonRepository<S> {
    type Target = DocumentRepository<PersonMapper, S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::store::InMemoryStore;

    fn repository() -> (Arc<InMemoryStore>, PersonRepository<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), PersonRepository::new(store))
    }

    #[tokio::test]
    async fn test_find_by_document() {
        let (_store, people) = repository();
        people
            .upsert(&Person::new("p1", "Alice").with_document("12345678901"))
            .await
            .unwrap();
        people.upsert(&Person::new("p2", "Bob")).await.unwrap();

        let found = people.find_by_document("12345678901").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(PersonId::from("p1")));
        assert!(people.find_by_document("00000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_name() {
        let (_store, people) = repository();
        for (id, name) in [("p1", "Alice"), ("p2", "Bob"), ("p3", "Alice")] {
            people.upsert(&Person::new(id, name)).await.unwrap();
        }

        let mut ids: Vec<String> = people
            .list_by_name("Alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["p1", "p3"]);
        assert!(people.list_by_name("Carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collection_name() {
        let (store, people) = repository();
        people.save(&Person::new("p1", "Alice")).await.unwrap();

        assert_eq!(people.collection(), PERSON_COLLECTION);
        assert!(store.document(PERSON_COLLECTION, "p1").is_some());
    }

    #[tokio::test]
    async fn test_transaction_hands_out_person_repository() {
        let (store, people) = repository();

        let found = people
            .transaction(|tx| async move {
                tx.upsert(&Person::new("p1", "Alice").with_document("12345678901"))
                    .await?;
                let found = tx.find_by_document("12345678901").await?;
                Ok::<_, RepositoryError>(found)
            })
            .await
            .unwrap();

        assert!(found.is_some());
        assert!(people.find(&PersonId::from("p1")).await.unwrap().is_some());
        assert_eq!(store.open_sessions(), 0);
    }
}
