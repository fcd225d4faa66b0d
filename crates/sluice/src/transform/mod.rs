//! Transform: raw CSV export → typed Parquet artifact with provenance columns.
//!
//! Output columns are `data_date` (Date32), the raw columns with inferred
//! types, then `ptn_yyyy`, `ptn_mm`, `ptn_dd` (Int64). Row count and row order
//! are preserved.

mod infer;

pub use infer::{build_array, infer_type};

use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use deltalake::arrow::array::{ArrayRef, Date32Array, Int64Array, RecordBatch, RecordBatchOptions};
use deltalake::arrow::datatypes::{DataType, Field, Schema};
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::file::properties::WriterProperties;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::info;

use sluice_core::emit;
use sluice_core::metrics::events::{BytesWritten, RowsProcessed, Step};
use sluice_core::storage::StorageProviderRef;

use crate::config::ParquetCompression;
use crate::error::{
    BuildBatchSnafu, ColumnConflictSnafu, CsvDecodeSnafu, DownloadExportSnafu, EncodeParquetSnafu,
    TransformError, UploadArtifactSnafu,
};
use crate::partition::PartitionKey;
use crate::pipeline::RunContext;
use crate::source::Source;

pub const DATA_DATE_COLUMN: &str = "data_date";
pub const PTN_YYYY_COLUMN: &str = "ptn_yyyy";
pub const PTN_MM_COLUMN: &str = "ptn_mm";
pub const PTN_DD_COLUMN: &str = "ptn_dd";

/// Columns added by the transform, in no particular order.
pub const PROVENANCE_COLUMNS: [&str; 4] =
    [DATA_DATE_COLUMN, PTN_YYYY_COLUMN, PTN_MM_COLUMN, PTN_DD_COLUMN];

/// 1970-01-01 as days since 0001-01-01 (CE).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Outcome of one transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
    pub rows: usize,
    pub columns: usize,
    pub bytes: usize,
}

/// Converts staged exports into persisted Parquet artifacts.
#[derive(Debug, Clone)]
pub struct Transformer {
    storage: StorageProviderRef,
    compression: ParquetCompression,
}

impl Transformer {
    pub fn new(storage: StorageProviderRef, compression: ParquetCompression) -> Self {
        Self {
            storage,
            compression,
        }
    }

    /// Read the export at `staging`, enrich it, and write the artifact to
    /// `persisted`, replacing any previous artifact.
    pub async fn transform(
        &self,
        source: Source,
        ctx: &RunContext,
        staging: &Path,
        persisted: &Path,
    ) -> Result<TransformStats, TransformError> {
        let raw = self
            .storage
            .get(staging)
            .await
            .context(DownloadExportSnafu {
                path: staging.to_string(),
            })?;

        let batch = enrich(&raw, ctx.data_date(), &ctx.partition)?;
        let body = encode_parquet(&batch, self.compression)?;
        let bytes = body.len();

        self.storage
            .put_parquet(persisted, Bytes::from(body))
            .await
            .context(UploadArtifactSnafu {
                path: persisted.to_string(),
            })?;

        emit!(RowsProcessed {
            step: Step::Transform,
            count: batch.num_rows() as u64,
            target: source.name().to_string(),
        });
        emit!(BytesWritten {
            bytes: bytes as u64,
            target: source.name().to_string(),
        });

        info!(
            target = %source,
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            path = %persisted,
            "Persisted artifact"
        );

        Ok(TransformStats {
            rows: batch.num_rows(),
            columns: batch.num_columns(),
            bytes,
        })
    }
}

/// Parse a CSV export and add the provenance columns.
///
/// An empty export yields zero rows and only the provenance columns.
pub fn enrich(
    csv_bytes: &[u8],
    data_date: NaiveDate,
    partition: &PartitionKey,
) -> Result<RecordBatch, TransformError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_bytes);

    let header: Vec<String> = reader
        .headers()
        .context(CsvDecodeSnafu)?
        .iter()
        .map(str::to_string)
        .collect();

    if let Some(column) = header
        .iter()
        .find(|name| PROVENANCE_COLUMNS.contains(&name.as_str()))
    {
        return ColumnConflictSnafu { column }.fail();
    }

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .context(CsvDecodeSnafu)?;
    let rows = records.len();

    let mut fields = Vec::with_capacity(header.len() + PROVENANCE_COLUMNS.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

    let days = data_date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
    fields.push(Field::new(DATA_DATE_COLUMN, DataType::Date32, false));
    columns.push(Arc::new(Date32Array::from(vec![days; rows])));

    for (i, name) in header.iter().enumerate() {
        let cells = records.iter().map(move |r| r.get(i).unwrap_or_default());
        let data_type = infer_type(cells.clone());
        columns.push(build_array(&data_type, cells));
        fields.push(Field::new(name, data_type, true));
    }

    for (name, value) in [
        (PTN_YYYY_COLUMN, i64::from(partition.year)),
        (PTN_MM_COLUMN, i64::from(partition.month)),
        (PTN_DD_COLUMN, i64::from(partition.day)),
    ] {
        fields.push(Field::new(name, DataType::Int64, false));
        columns.push(Arc::new(Int64Array::from(vec![value; rows])));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)
        .context(BuildBatchSnafu)
}

/// Serialize a batch as a single Parquet file.
pub fn encode_parquet(
    batch: &RecordBatch,
    compression: ParquetCompression,
) -> Result<Vec<u8>, TransformError> {
    let properties = WriterProperties::builder()
        .set_compression(compression.codec())
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))
        .context(EncodeParquetSnafu)?;
    if batch.num_rows() > 0 {
        writer.write(batch).context(EncodeParquetSnafu)?;
    }
    writer.close().context(EncodeParquetSnafu)?;

    Ok(buffer)
}
