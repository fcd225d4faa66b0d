//! Delta Lake warehouse.
//!
//! Each table lives at `{root}/{dataset}/{table}`. A load copies the artifact
//! into the table directory and commits one `Write { mode: Overwrite }`
//! transaction that removes every active file and adds the new one, so
//! readers see either the old contents or the new, never a mix.

use async_trait::async_trait;
use bytes::Bytes;
use deltalake::DeltaTable;
use deltalake::arrow::datatypes::Schema;
use deltalake::kernel::{Action, Add, Remove, StructType};
use deltalake::operations::create::CreateBuilder;
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use deltalake::parquet::file::reader::{FileReader, SerializedFileReader};
use deltalake::protocol::{DeltaOperation, SaveMode};
use futures::future::try_join_all;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use sluice_core::storage::{BackendConfig, StorageProvider, StorageProviderRef};

use super::traits::{LoadReceipt, TableRef, Warehouse};
use crate::error::{
    DecodeArtifactSnafu, DeltaSnafu, TableNotFoundSnafu, TableSchemaSnafu, TableStorageSnafu,
    TableUrlSnafu, WarehouseError,
};

/// Register the cloud object store handlers with deltalake. Idempotent.
fn ensure_handlers_registered() {
    deltalake::gcp::register_handlers(None);
}

/// Convert an Arrow schema to a Delta schema.
fn arrow_schema_to_delta(schema: &Schema) -> Result<StructType, WarehouseError> {
    use deltalake::kernel::engine::arrow_conversion::TryIntoKernel;
    use deltalake::kernel::{DataType as DeltaType, StructField};

    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type: DeltaType = field
                .data_type()
                .try_into_kernel()
                .map_err(|source| WarehouseError::SchemaConversion { source })?;
            Ok(StructField::new(
                field.name(),
                delta_type,
                field.is_nullable(),
            ))
        })
        .collect::<Result<Vec<_>, WarehouseError>>()?;

    StructType::try_new(fields).map_err(|e| {
        TableSchemaSnafu {
            message: e.to_string(),
        }
        .build()
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Final path segment of a file URI.
fn file_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Delta Lake tables under a common root.
#[derive(Debug, Clone)]
pub struct DeltaWarehouse {
    storage: StorageProviderRef,
}

impl DeltaWarehouse {
    /// Connect to the warehouse root at `url`.
    pub async fn new(url: &str, options: HashMap<String, String>) -> Result<Self, WarehouseError> {
        ensure_handlers_registered();
        let storage = StorageProvider::shared(url, options)
            .await
            .context(TableStorageSnafu)?;
        Ok(Self { storage })
    }

    fn table_dir(table: &TableRef) -> Path {
        Path::from(format!("{}/{}", table.dataset, table.name))
    }

    fn table_url(&self, table: &TableRef) -> Result<Url, WarehouseError> {
        let dir = Self::table_dir(table);
        let url = match self.storage.config() {
            BackendConfig::Gcs(gcs) => {
                format!("gs://{}/{}", gcs.bucket, self.storage.qualify_path(&dir))
            }
            BackendConfig::Local(local) => {
                format!("file://{}/{}", local.path.trim_end_matches('/'), dir)
            }
        };
        Url::parse(&url).context(TableUrlSnafu { url })
    }

    async fn try_open(&self, table: &TableRef) -> Result<DeltaTable, WarehouseError> {
        let url = self.table_url(table)?;
        deltalake::open_table_with_storage_options(url, self.storage.storage_options().clone())
            .await
            .context(DeltaSnafu)
    }

    async fn open_or_create(
        &self,
        table: &TableRef,
        schema: &StructType,
    ) -> Result<DeltaTable, WarehouseError> {
        match self.try_open(table).await {
            Ok(opened) => {
                debug!(
                    table = %table,
                    "Loaded existing Delta table at version {}",
                    opened.version().unwrap_or(-1)
                );
                Ok(opened)
            }
            Err(e) => {
                debug!(table = %table, error = %e, "Delta table not readable, creating it");
                let url = self.table_url(table)?;

                if let BackendConfig::Local(_) = self.storage.config()
                    && let Ok(path) = url.to_file_path()
                {
                    tokio::fs::create_dir_all(&path)
                        .await
                        .map_err(|source| WarehouseError::TableStorage {
                            source: sluice_core::StorageError::Io { source },
                        })?;
                }

                info!(table = %table, "Creating Delta table at {}", url);
                CreateBuilder::new()
                    .with_location(url.as_str())
                    .with_table_name(table.name.as_str())
                    .with_columns(schema.fields().cloned())
                    .with_storage_options(self.storage.storage_options().clone())
                    .await
                    .context(DeltaSnafu)
            }
        }
    }

    fn active_files(table: &DeltaTable) -> Result<Vec<String>, WarehouseError> {
        let uris = table.get_file_uris().context(DeltaSnafu)?;
        Ok(uris.map(|uri| file_name(&uri).to_string()).collect())
    }
}

#[async_trait]
impl Warehouse for DeltaWarehouse {
    async fn load_overwrite(
        &self,
        table: &TableRef,
        artifact: Bytes,
    ) -> Result<LoadReceipt, WarehouseError> {
        use deltalake::kernel::MetadataExt;
        use deltalake::kernel::transaction::CommitBuilder;

        let reader = ParquetRecordBatchReaderBuilder::try_new(artifact.clone())
            .context(DecodeArtifactSnafu)?;
        let rows = reader.metadata().file_metadata().num_rows();
        let delta_schema = arrow_schema_to_delta(reader.schema())?;

        let mut delta_table = self.open_or_create(table, &delta_schema).await?;

        let file = format!("part-{}.parquet", Uuid::new_v4());
        let size = artifact.len();
        self.storage
            .put(&Self::table_dir(table).child(file.as_str()), artifact)
            .await
            .context(TableStorageSnafu)?;

        let now = now_millis();
        let previous = Self::active_files(&delta_table)?;
        let snapshot = delta_table.snapshot().context(DeltaSnafu)?;

        let mut actions: Vec<Action> = previous
            .iter()
            .map(|path| {
                Action::Remove(Remove {
                    path: path.clone(),
                    deletion_timestamp: Some(now),
                    data_change: true,
                    ..Default::default()
                })
            })
            .collect();

        let current_fields: Vec<_> = snapshot.schema().fields().cloned().collect();
        let new_fields: Vec<_> = delta_schema.fields().cloned().collect();
        if current_fields != new_fields {
            info!(table = %table, "Replacing table schema ({} columns)", new_fields.len());
            let metadata = snapshot
                .metadata()
                .clone()
                .with_schema(&delta_schema)
                .map_err(|source| WarehouseError::Delta {
                    source: deltalake::DeltaTableError::Kernel { source },
                })?;
            actions.push(Action::Metadata(metadata));
        }

        actions.push(Action::Add(Add {
            path: file.clone(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
            partition_values: HashMap::new(),
            modification_time: now,
            data_change: true,
            stats: Some(format!("{{\"numRecords\":{rows}}}")),
            ..Default::default()
        }));

        let version = CommitBuilder::default()
            .with_actions(actions)
            .build(
                Some(snapshot),
                delta_table.log_store(),
                DeltaOperation::Write {
                    mode: SaveMode::Overwrite,
                    partition_by: None,
                    predicate: None,
                },
            )
            .await
            .context(DeltaSnafu)?
            .version;

        delta_table.load().await.context(DeltaSnafu)?;

        info!(
            table = %table,
            version,
            rows,
            replaced_files = previous.len(),
            "Overwrote Delta table"
        );

        Ok(LoadReceipt {
            rows: u64::try_from(rows).unwrap_or_default(),
            version: Some(version),
        })
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        let delta_table = self.try_open(table).await.map_err(|_| {
            TableNotFoundSnafu {
                table: table.to_string(),
            }
            .build()
        })?;

        let dir = Self::table_dir(table);
        let counts = try_join_all(Self::active_files(&delta_table)?.into_iter().map(|name| {
            let path = dir.child(name.as_str());
            async move {
                let bytes = self.storage.get(&path).await.context(TableStorageSnafu)?;
                let reader = SerializedFileReader::new(bytes).context(DecodeArtifactSnafu)?;
                Ok::<_, WarehouseError>(reader.metadata().file_metadata().num_rows())
            }
        }))
        .await?;

        Ok(counts
            .into_iter()
            .map(|rows| u64::try_from(rows).unwrap_or_default())
            .sum())
    }

    fn describe(&self) -> String {
        format!("delta:{}", self.storage.canonical_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParquetCompression;
    use crate::partition::PartitionKey;
    use crate::transform::{encode_parquet, enrich};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn artifact(csv: &str) -> Bytes {
        let key = PartitionKey {
            year: 2024,
            month: 3,
            day: 5,
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let batch = enrich(csv.as_bytes(), date, &key).unwrap();
        Bytes::from(encode_parquet(&batch, ParquetCompression::Snappy).unwrap())
    }

    fn rows_csv(n: usize) -> String {
        let mut csv = String::from("account_id,limit\n");
        for i in 0..n {
            csv.push_str(&format!("{i},{}\n", i * 100));
        }
        csv
    }

    async fn warehouse(dir: &TempDir) -> DeltaWarehouse {
        DeltaWarehouse::new(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_file_name_from_uri() {
        assert_eq!(file_name("/tmp/wh/datalake/t/part-1.parquet"), "part-1.parquet");
        assert_eq!(file_name("gs://b/datalake/t/part-2.parquet"), "part-2.parquet");
    }

    #[tokio::test]
    async fn test_first_load_creates_table() {
        let dir = TempDir::new().unwrap();
        let warehouse = warehouse(&dir).await;
        let table = TableRef::parse("datalake.account_csv").unwrap();

        let receipt = warehouse
            .load_overwrite(&table, artifact(&rows_csv(3)))
            .await
            .unwrap();

        assert_eq!(receipt.rows, 3);
        assert_eq!(warehouse.row_count(&table).await.unwrap(), 3);
        assert!(dir.path().join("datalake/account_csv/_delta_log").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_all_rows() {
        let dir = TempDir::new().unwrap();
        let warehouse = warehouse(&dir).await;
        let table = TableRef::parse("datalake.account_csv").unwrap();

        warehouse
            .load_overwrite(&table, artifact(&rows_csv(1000)))
            .await
            .unwrap();
        assert_eq!(warehouse.row_count(&table).await.unwrap(), 1000);

        let receipt = warehouse
            .load_overwrite(&table, artifact(&rows_csv(10)))
            .await
            .unwrap();

        assert_eq!(receipt.rows, 10);
        assert_eq!(warehouse.row_count(&table).await.unwrap(), 10);
        assert!(receipt.version.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_overwrite_with_new_schema() {
        let dir = TempDir::new().unwrap();
        let warehouse = warehouse(&dir).await;
        let table = TableRef::parse("datalake.transaction_csv").unwrap();

        warehouse
            .load_overwrite(&table, artifact("account_id\n1\n2\n"))
            .await
            .unwrap();
        warehouse
            .load_overwrite(&table, artifact("account_id,transaction_count\n1,66\n"))
            .await
            .unwrap();

        assert_eq!(warehouse.row_count(&table).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_row_count_of_missing_table() {
        let dir = TempDir::new().unwrap();
        let warehouse = warehouse(&dir).await;
        let table = TableRef::parse("datalake.never_loaded").unwrap();

        let err = warehouse.row_count(&table).await.unwrap_err();
        assert!(matches!(err, WarehouseError::TableNotFound { .. }));
    }
}
