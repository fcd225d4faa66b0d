//! Error types for the sluice pipeline.
//!
//! One enum per step. A chain wraps whichever step failed in [`ChainError`],
//! which also knows the state the chain was in at that moment.

use snafu::prelude::*;

pub use sluice_core::error::{ConfigError, LeaseError, MetricsError, StorageError};

use crate::pipeline::ChainState;

/// Errors raised by document store adapters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DocumentStoreError {
    /// The store location could not be opened.
    #[snafu(display("Failed to open document store at {url}: {source}"))]
    OpenStore { url: String, source: StorageError },

    /// Reading the collection failed.
    #[snafu(display("Failed to read collection '{collection}': {source}"))]
    ReadCollection {
        collection: String,
        source: StorageError,
    },

    /// A line of the collection dump is not valid JSON.
    #[snafu(display("Invalid document in '{collection}' at line {line}: {source}"))]
    DecodeDocument {
        collection: String,
        line: usize,
        source: serde_json::Error,
    },

    /// A line of the collection dump is valid JSON but not an object.
    #[snafu(display("Document in '{collection}' at line {line} is not an object"))]
    NotAnObject { collection: String, line: usize },

    /// Connecting to a live deployment failed.
    #[snafu(display("Failed to connect to {target}: {source}"))]
    MongoConnect {
        target: String,
        source: mongodb::error::Error,
    },

    /// Querying a live collection failed.
    #[snafu(display("Failed to query collection '{collection}': {source}"))]
    MongoQuery {
        collection: String,
        source: mongodb::error::Error,
    },

    /// The store refused the request.
    #[snafu(display("Document store unavailable for '{collection}': {message}"))]
    StoreUnavailable { collection: String, message: String },
}

/// Errors that can occur while exporting a collection.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractError {
    /// Fetching documents failed.
    #[snafu(display("Failed to fetch documents: {source}"))]
    Fetch { source: DocumentStoreError },

    /// Writing a CSV record failed.
    #[snafu(display("Failed to encode CSV: {source}"))]
    CsvEncode { source: csv::Error },

    /// Flushing the CSV writer failed.
    #[snafu(display("Failed to flush CSV writer: {message}"))]
    CsvFlush { message: String },

    /// Uploading the export failed.
    #[snafu(display("Failed to upload export to {path}: {source}"))]
    UploadExport { path: String, source: StorageError },
}

/// Errors that can occur while converting an export to Parquet.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// Downloading the export failed.
    #[snafu(display("Failed to download export {path}: {source}"))]
    DownloadExport { path: String, source: StorageError },

    /// The export is not valid CSV.
    #[snafu(display("Failed to parse CSV: {source}"))]
    CsvDecode { source: csv::Error },

    /// A raw column collides with a provenance column.
    #[snafu(display("Export already contains a column named '{column}'"))]
    ColumnConflict { column: String },

    /// Assembling the record batch failed.
    #[snafu(display("Failed to build record batch: {source}"))]
    BuildBatch {
        source: deltalake::arrow::error::ArrowError,
    },

    /// Encoding the Parquet file failed.
    #[snafu(display("Failed to encode Parquet: {source}"))]
    EncodeParquet {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Uploading the artifact failed.
    #[snafu(display("Failed to upload artifact to {path}: {source}"))]
    UploadArtifact { path: String, source: StorageError },
}

/// Errors raised by warehouse implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// Table storage failed.
    #[snafu(display("Warehouse storage error: {source}"))]
    TableStorage { source: StorageError },

    /// The artifact could not be decoded.
    #[snafu(display("Failed to decode artifact: {source}"))]
    DecodeArtifact {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// The artifact schema could not be mapped to a table schema.
    #[snafu(display("Failed to convert schema: {source}"))]
    SchemaConversion {
        source: deltalake::arrow::error::ArrowError,
    },

    /// Building the table schema failed.
    #[snafu(display("Invalid table schema: {message}"))]
    TableSchema { message: String },

    /// A Delta Lake operation failed.
    #[snafu(display("Delta Lake operation failed: {source}"))]
    Delta { source: deltalake::DeltaTableError },

    /// The table URL could not be parsed.
    #[snafu(display("Failed to parse table URL {url}: {source}"))]
    TableUrl {
        url: String,
        source: url::ParseError,
    },

    /// Table names must be `dataset.table`.
    #[snafu(display("Invalid table name '{table}': expected 'dataset.table'"))]
    InvalidTableName { table: String },

    /// The table has never been loaded.
    #[snafu(display("Table '{table}' does not exist"))]
    TableNotFound { table: String },
}

/// Errors that can occur while loading an artifact.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// The artifact could not be read.
    #[snafu(display("Failed to read artifact {path}: {source}"))]
    ReadArtifact { path: String, source: StorageError },

    /// The warehouse rejected the load.
    #[snafu(display("Failed to load {table}: {source}"))]
    WarehouseLoad {
        table: String,
        source: WarehouseError,
    },
}

/// Failure of a single extract → transform → load chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ChainError {
    /// The partition lease could not be acquired.
    #[snafu(display("Lease not acquired: {source}"))]
    LeaseAcquire { source: LeaseError },

    /// Extraction failed.
    #[snafu(display("Extract failed: {source}"))]
    ExtractStep { source: ExtractError },

    /// Transformation failed.
    #[snafu(display("Transform failed: {source}"))]
    TransformStep { source: TransformError },

    /// Loading failed.
    #[snafu(display("Load failed: {source}"))]
    LoadStep { source: LoadError },
}

impl ChainError {
    /// The state the chain was in when it failed.
    pub fn failed_state(&self) -> ChainState {
        match self {
            ChainError::LeaseAcquire { .. } => ChainState::Pending,
            ChainError::ExtractStep { .. } => ChainState::Extracting,
            ChainError::TransformStep { .. } => ChainState::Transforming,
            ChainError::LoadStep { .. } => ChainState::Loading,
        }
    }
}

/// Top-level errors: setup problems that prevent a run from starting.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Warehouse error.
    #[snafu(display("Warehouse error: {source}"))]
    Warehouse { source: WarehouseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// `--source` names no known source.
    #[snafu(display("Unknown source '{name}': expected 'account' or 'transaction'"))]
    UnknownSource { name: String },

    /// `--date` is not `YYYY-MM-DD`.
    #[snafu(display("Invalid run date '{value}': {source}"))]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}
