//! In-process document store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::{Document, DocumentStore};
use crate::error::{DocumentStoreError, StoreUnavailableSnafu};

#[derive(Debug, Default)]
struct Collections {
    documents: HashMap<String, Vec<Document>>,
    failures: HashMap<String, String>,
}

/// Collections held in memory. Individual collections can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`MemoryDocumentStore::insert`].
    pub fn with_collection(self, collection: &str, documents: Vec<Document>) -> Self {
        self.insert(collection, documents);
        self
    }

    /// Replace the contents of a collection.
    pub fn insert(&self, collection: &str, documents: Vec<Document>) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.documents.insert(collection.to_string(), documents);
    }

    /// Make every fetch of `collection` fail with `message`.
    pub fn fail_collection(&self, collection: &str, message: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner
            .failures
            .insert(collection.to_string(), message.to_string());
    }

    /// Undo [`MemoryDocumentStore::fail_collection`].
    pub fn heal_collection(&self, collection: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.failures.remove(collection);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        if let Some(message) = inner.failures.get(collection) {
            return StoreUnavailableSnafu {
                collection,
                message: message.as_str(),
            }
            .fail();
        }
        Ok(inner
            .documents
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
