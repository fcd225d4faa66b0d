//! sluice: daily document store → object storage → warehouse batch ETL.
//!
//! Each run copies the `accounts` and `transactions` collections through
//! three steps, as two independent chains:
//! - `extract` - full collection scan to a CSV export under `raw_data/`
//! - `transform` - typed Parquet with provenance columns under `persist_data/`
//! - `load` - full overwrite of the warehouse table
//!
//! Artifacts are partitioned by the run date (`ptn_yyyy=/ptn_mm=/ptn_dd=`).

pub mod app;
pub mod cli;
pub mod config;
pub mod docstore;
pub mod error;
pub mod extract;
pub mod load;
pub mod partition;
pub mod paths;
pub mod pipeline;
pub mod schedule;
pub mod source;
pub mod transform;
pub mod warehouse;

// Re-export commonly used items
pub use cli::CliArgs;
pub use config::Config;
pub use error::{ChainError, PipelineError};
pub use partition::{Clock, FixedClock, PartitionKey, SystemClock};
pub use pipeline::{ChainReport, ChainState, Pipeline, RunContext, RunSummary};
pub use source::Source;

pub use sluice_core::{StorageProvider, StorageProviderRef, init_tracing};
