use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Collection names used by the engine.
pub mod collections {
    pub const ITEMS: &str = "items";
    pub const REQUESTS: &str = "requests";
    pub const RATING_EVENTS: &str = "rating_events";
    pub const SUBJECT_RATINGS: &str = "subject_ratings";
}

/// A stored document together with its optimistic-concurrency version token.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub version: u64,
    pub body: serde_json::Value,
}

/// Interface boundary to the external document store.
///
/// The engine only assumes point reads and writes by id, an atomic
/// conditional write, and field-equality queries. `compare_and_swap` is the
/// primitive that turns check-then-mutate sequences into one atomic unit;
/// a version miss surfaces as a conflict and is never retried here.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>>;

    /// Create a new document. Fails with a conflict if the id already exists.
    async fn insert(&self, collection: &str, id: &str, body: serde_json::Value) -> Result<u64>;

    /// Replace a document iff its current version equals `expected_version`.
    /// Returns the new version on success.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: serde_json::Value,
    ) -> Result<u64>;

    /// All documents in `collection` whose top-level `field` equals `value`.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<(String, VersionedDocument)>>;
}

/// In-memory reference implementation of the store contract.
///
/// Versions start at 1 and are bumped on every successful swap under the
/// write lock, which is what makes check-and-replace atomic here.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, VersionedDocument>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn insert(&self, collection: &str, id: &str, body: serde_json::Value) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(BookingError::Conflict {
                subject: id.to_string(),
                detail: format!("document already exists in {}", collection),
            });
        }
        docs.insert(id.to_string(), VersionedDocument { version: 1, body });
        Ok(1)
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: serde_json::Value,
    ) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BookingError::NotFound {
                kind: "document",
                id: format!("{}/{}", collection, id),
            })?;
        if doc.version != expected_version {
            return Err(BookingError::Conflict {
                subject: id.to_string(),
                detail: format!(
                    "version {} does not match expected {}",
                    doc.version, expected_version
                ),
            });
        }
        doc.version += 1;
        doc.body = body;
        Ok(doc.version)
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<(String, VersionedDocument)>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| doc.body.get(field) == Some(value))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }
}
