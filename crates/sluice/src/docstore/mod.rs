//! Document store access.
//!
//! The extractor only needs "give me every document of a collection", so the
//! store is a trait with three adapters:
//! - `MongoDocumentStore`: a live MongoDB deployment (`mongodb://`, `mongodb+srv://`)
//! - `ExportDocumentStore`: collection dumps (`mongoexport` output) in object storage
//! - `MemoryDocumentStore`: in-process collections for tests and dry runs

mod export;
mod memory;
mod mongo;
mod traits;

pub use export::ExportDocumentStore;
pub use memory::MemoryDocumentStore;
pub use mongo::{MONGO_SCHEMES, MongoDocumentStore, is_mongo_url};
pub use traits::{Document, DocumentStore, DocumentStoreRef};

use std::collections::HashMap;
use std::sync::Arc;

/// Pick the adapter for `url`: a live deployment for MongoDB schemes,
/// collection dumps for everything else.
pub fn open(url: &str, database: &str, options: HashMap<String, String>) -> DocumentStoreRef {
    if is_mongo_url(url) {
        Arc::new(MongoDocumentStore::new(url, database))
    } else {
        Arc::new(ExportDocumentStore::new(url, database, options))
    }
}
