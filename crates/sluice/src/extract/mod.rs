//! Extract: full collection scan → CSV export in the staging area.

mod encode;

pub use encode::{EncodedExport, encode_csv, render_cell, union_header};

use bytes::Bytes;
use snafu::prelude::*;
use tracing::{debug, info};

use sluice_core::emit;
use sluice_core::metrics::events::{BytesWritten, RowsProcessed, Step};
use sluice_core::storage::StorageProviderRef;

use crate::docstore::DocumentStoreRef;
use crate::error::{ExtractError, FetchSnafu, UploadExportSnafu};
use crate::paths::ArtifactPaths;
use crate::pipeline::RunContext;
use crate::source::Source;

/// Outcome of one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub documents: usize,
    pub columns: usize,
    pub bytes: usize,
}

/// Copies a collection into the staging area as CSV.
#[derive(Clone)]
pub struct Extractor {
    store: DocumentStoreRef,
    storage: StorageProviderRef,
}

impl Extractor {
    pub fn new(store: DocumentStoreRef, storage: StorageProviderRef) -> Self {
        Self { store, storage }
    }

    /// Export every document of `source`'s collection to its staging path,
    /// replacing any previous export for the same partition.
    pub async fn extract(
        &self,
        source: Source,
        ctx: &RunContext,
    ) -> Result<ExtractStats, ExtractError> {
        let paths = ArtifactPaths::new(source, &ctx.partition);

        debug!(
            target = %source,
            collection = source.collection(),
            store = %self.store.describe(),
            "Fetching collection"
        );
        let documents = self
            .store
            .fetch_all(source.collection())
            .await
            .context(FetchSnafu)?;

        let export = encode_csv(&documents)?;
        let bytes = export.body.len();

        self.storage
            .put_csv(&paths.staging, Bytes::from(export.body))
            .await
            .context(UploadExportSnafu {
                path: paths.staging.to_string(),
            })?;

        emit!(RowsProcessed {
            step: Step::Extract,
            count: export.rows as u64,
            target: source.name().to_string(),
        });
        emit!(BytesWritten {
            bytes: bytes as u64,
            target: source.name().to_string(),
        });

        info!(
            target = %source,
            documents = export.rows,
            columns = export.columns,
            path = %paths.staging,
            "Exported collection"
        );

        Ok(ExtractStats {
            documents: export.rows,
            columns: export.columns,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use crate::partition::FixedClock;
    use chrono::NaiveDate;
    use serde_json::json;
    use sluice_core::storage::StorageProvider;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        )))
    }

    async fn storage(dir: &TempDir) -> StorageProviderRef {
        StorageProvider::shared(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_extract_writes_staging_csv() {
        let dir = TempDir::new().unwrap();
        let store = MemoryDocumentStore::new().with_collection(
            "accounts",
            vec![
                json!({"account_id": 371138, "limit": 9000})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ],
        );
        let extractor = Extractor::new(Arc::new(store), storage(&dir).await);

        let stats = extractor.extract(Source::Account, &ctx()).await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.columns, 2);

        let written = std::fs::read_to_string(
            dir.path()
                .join("raw_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account_extract.csv"),
        )
        .unwrap();
        assert_eq!(written, "account_id,limit\n371138,9000\n");
    }

    #[tokio::test]
    async fn test_extract_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = MemoryDocumentStore::new();
        store.fail_collection("transactions", "timeout");
        let extractor = Extractor::new(Arc::new(store), storage(&dir).await);

        let err = extractor
            .extract(Source::Transaction, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Fetch { .. }));
        assert!(!dir.path().join("raw_data").exists());
    }

    #[tokio::test]
    async fn test_extract_empty_collection() {
        let dir = TempDir::new().unwrap();
        let extractor = Extractor::new(Arc::new(MemoryDocumentStore::new()), storage(&dir).await);

        let stats = extractor.extract(Source::Account, &ctx()).await.unwrap();
        assert_eq!(stats.bytes, 0);
        let written = std::fs::read(
            dir.path()
                .join("raw_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account_extract.csv"),
        )
        .unwrap();
        assert!(written.is_empty());
    }
}
