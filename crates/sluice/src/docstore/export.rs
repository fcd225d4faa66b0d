//! Collection dumps in object storage.
//!
//! Reads `{url}/{database}/{collection}.json` as written by `mongoexport`:
//! either one extended-JSON document per line, or a single JSON array
//! (`--jsonArray`).

use async_trait::async_trait;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use sluice_core::storage::StorageProvider;

use super::traits::{Document, DocumentStore};
use crate::error::{
    DecodeDocumentSnafu, DocumentStoreError, NotAnObjectSnafu, OpenStoreSnafu, ReadCollectionSnafu,
};

/// Document store backed by collection dump files.
#[derive(Debug, Clone)]
pub struct ExportDocumentStore {
    url: String,
    database: String,
    options: HashMap<String, String>,
}

impl ExportDocumentStore {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        options: HashMap<String, String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            options,
        }
    }

    fn collection_path(&self, collection: &str) -> Path {
        Path::from(format!("{}/{collection}.json", self.database))
    }
}

#[async_trait]
impl DocumentStore for ExportDocumentStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        // A fresh handle per call; nothing is shared between chains.
        let storage = StorageProvider::for_url_with_options(&self.url, self.options.clone())
            .await
            .context(OpenStoreSnafu { url: &self.url })?;

        let path = self.collection_path(collection);
        let bytes = match storage.get(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!(collection, path = %path, "Collection dump not found, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).context(ReadCollectionSnafu { collection }),
        };

        parse_dump(collection, &bytes)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.database)
    }
}

/// Decode a dump body into documents.
pub(crate) fn parse_dump(
    collection: &str,
    bytes: &[u8],
) -> Result<Vec<Document>, DocumentStoreError> {
    let is_array = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[');

    if is_array {
        let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)
            .context(DecodeDocumentSnafu {
                collection,
                line: 1usize,
            })?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, value)| into_document(collection, i + 1, value))
            .collect();
    }

    let mut documents = Vec::new();
    for (i, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        let value: serde_json::Value = serde_json::from_slice(line).context(DecodeDocumentSnafu {
            collection,
            line: i + 1,
        })?;
        documents.push(into_document(collection, i + 1, value)?);
    }
    Ok(documents)
}

fn into_document(
    collection: &str,
    line: usize,
    value: serde_json::Value,
) -> Result<Document, DocumentStoreError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => NotAnObjectSnafu { collection, line }.fail(),
    }
}
