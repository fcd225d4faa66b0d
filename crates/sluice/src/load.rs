//! Load: persisted artifact → warehouse table, full overwrite.

use object_store::path::Path;
use snafu::prelude::*;
use tracing::info;

use sluice_core::emit;
use sluice_core::metrics::events::{RowsProcessed, Step};
use sluice_core::storage::StorageProviderRef;

use crate::error::{LoadError, ReadArtifactSnafu, WarehouseLoadSnafu};
use crate::source::Source;
use crate::warehouse::{TableRef, WarehouseRef};

/// Outcome of one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows in the table after the load.
    pub rows: u64,
    /// Table version, when the warehouse is versioned.
    pub version: Option<i64>,
}

/// Replaces warehouse tables with persisted artifacts.
#[derive(Clone)]
pub struct Loader {
    storage: StorageProviderRef,
    warehouse: WarehouseRef,
}

impl Loader {
    pub fn new(storage: StorageProviderRef, warehouse: WarehouseRef) -> Self {
        Self { storage, warehouse }
    }

    /// Overwrite `source`'s table with the artifact at `persisted`.
    pub async fn load(&self, source: Source, persisted: &Path) -> Result<LoadStats, LoadError> {
        let table_name = source.table();
        let table = TableRef::parse(table_name).context(WarehouseLoadSnafu { table: table_name })?;

        let artifact = self
            .storage
            .get(persisted)
            .await
            .context(ReadArtifactSnafu {
                path: persisted.to_string(),
            })?;

        let receipt = self
            .warehouse
            .load_overwrite(&table, artifact)
            .await
            .context(WarehouseLoadSnafu { table: table_name })?;

        emit!(RowsProcessed {
            step: Step::Load,
            count: receipt.rows,
            target: source.name().to_string(),
        });

        info!(
            target = %source,
            table = %table,
            rows = receipt.rows,
            version = ?receipt.version,
            warehouse = %self.warehouse.describe(),
            "Loaded table"
        );

        Ok(LoadStats {
            rows: receipt.rows,
            version: receipt.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParquetCompression;
    use crate::partition::PartitionKey;
    use crate::paths::ArtifactPaths;
    use crate::transform::{encode_parquet, enrich};
    use crate::warehouse::{MemoryWarehouse, Warehouse};
    use bytes::Bytes;
    use chrono::NaiveDate;
    use sluice_core::storage::StorageProvider;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn key() -> PartitionKey {
        PartitionKey {
            year: 2024,
            month: 3,
            day: 5,
        }
    }

    #[tokio::test]
    async fn test_load_overwrites_table() {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::shared(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        let warehouse = Arc::new(MemoryWarehouse::new());
        let loader = Loader::new(storage.clone(), warehouse.clone());

        let batch = enrich(
            b"account_id,limit\n1,100\n2,200\n3,300\n",
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            &key(),
        )
        .unwrap();
        let paths = ArtifactPaths::new(Source::Account, &key());
        storage
            .put_parquet(
                &paths.persisted,
                Bytes::from(encode_parquet(&batch, ParquetCompression::Snappy).unwrap()),
            )
            .await
            .unwrap();

        let stats = loader.load(Source::Account, &paths.persisted).await.unwrap();
        assert_eq!(stats.rows, 3);

        let table = TableRef::parse(Source::Account.table()).unwrap();
        assert_eq!(warehouse.row_count(&table).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::shared(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        let loader = Loader::new(storage, Arc::new(MemoryWarehouse::new()));

        let paths = ArtifactPaths::new(Source::Transaction, &key());
        let err = loader
            .load(Source::Transaction, &paths.persisted)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::ReadArtifact { .. }));
    }
}
