//! The `DocumentStore` trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DocumentStoreError;

/// A single document: a JSON object with its fields in stored order.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Shared handle to a document store.
pub type DocumentStoreRef = Arc<dyn DocumentStore>;

/// Read access to a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return every document of `collection`, unfiltered and unprojected.
    ///
    /// A collection that does not exist yields an empty vector.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}
