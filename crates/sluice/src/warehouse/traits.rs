//! The `Warehouse` trait.

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;

use crate::error::{InvalidTableNameSnafu, WarehouseError};

/// Shared handle to a warehouse.
pub type WarehouseRef = Arc<dyn Warehouse>;

/// Result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReceipt {
    /// Rows now in the table.
    pub rows: u64,
    /// Table version after the load, for versioned tables.
    pub version: Option<i64>,
}

/// A `dataset.table` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub name: String,
}

impl TableRef {
    pub fn parse(table: &str) -> Result<Self, WarehouseError> {
        match table.split_once('.') {
            Some((dataset, name))
                if !dataset.is_empty() && !name.is_empty() && !name.contains(['.', '/']) =>
            {
                Ok(Self {
                    dataset: dataset.to_string(),
                    name: name.to_string(),
                })
            }
            _ => InvalidTableNameSnafu { table }.fail(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

/// A destination for persisted artifacts.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Replace the entire contents of `table` with the rows of a Parquet
    /// artifact, creating the table if needed.
    async fn load_overwrite(
        &self,
        table: &TableRef,
        artifact: Bytes,
    ) -> Result<LoadReceipt, WarehouseError>;

    /// Number of rows currently in `table`.
    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}
