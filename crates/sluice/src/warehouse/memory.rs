//! In-process warehouse.

use async_trait::async_trait;
use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::traits::{LoadReceipt, TableRef, Warehouse};
use crate::error::{DecodeArtifactSnafu, SchemaConversionSnafu, TableNotFoundSnafu, WarehouseError};

/// Tables of decoded record batches.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: RwLock<HashMap<TableRef, Vec<RecordBatch>>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put rows into a table directly, bypassing the load path.
    pub fn seed(&self, table: &TableRef, batches: Vec<RecordBatch>) {
        let mut tables = self.tables.write().unwrap_or_else(|p| p.into_inner());
        tables.insert(table.clone(), batches);
    }

    /// Current contents of a table.
    pub fn batches(&self, table: &TableRef) -> Option<Vec<RecordBatch>> {
        let tables = self.tables.read().unwrap_or_else(|p| p.into_inner());
        tables.get(table).cloned()
    }
}

fn decode(artifact: Bytes) -> Result<Vec<RecordBatch>, WarehouseError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(artifact)
        .context(DecodeArtifactSnafu)?
        .build()
        .context(DecodeArtifactSnafu)?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .context(SchemaConversionSnafu)
}

fn count_rows(batches: &[RecordBatch]) -> u64 {
    batches.iter().map(|b| b.num_rows() as u64).sum()
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn load_overwrite(
        &self,
        table: &TableRef,
        artifact: Bytes,
    ) -> Result<LoadReceipt, WarehouseError> {
        let batches = decode(artifact)?;
        let rows = count_rows(&batches);

        let mut tables = self.tables.write().unwrap_or_else(|p| p.into_inner());
        let replaced = tables.insert(table.clone(), batches);
        debug!(
            table = %table,
            rows,
            replaced_rows = replaced.as_deref().map(count_rows).unwrap_or_default(),
            "Overwrote in-memory table"
        );

        Ok(LoadReceipt {
            rows,
            version: None,
        })
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        let tables = self.tables.read().unwrap_or_else(|p| p.into_inner());
        tables
            .get(table)
            .map(|batches| count_rows(batches))
            .context(TableNotFoundSnafu {
                table: table.to_string(),
            })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
