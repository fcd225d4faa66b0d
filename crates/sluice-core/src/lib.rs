//! sluice-core: shared building blocks for the sluice pipeline.
//!
//! - `storage/` - Object storage abstraction (GCS, local) and partition leases
//! - `metrics/` - Prometheus metrics infrastructure
//! - `config/` - YAML loading with environment variable interpolation
//! - `topology/` - Concurrent execution of independent chains
//! - `signal` - Signal handling for graceful shutdown
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod topology;
pub mod tracing;

// Re-export commonly used items
pub use error::{ConfigError, LeaseError, MetricsError, StorageError};
pub use metrics::{init_global as init_metrics, init_recorder};
pub use signal::{shutdown_signal, shutdown_token};
pub use storage::{Lease, PartitionLease, StorageProvider, StorageProviderRef};
pub use topology::{Chain, ChainOutcome, ChainRunner};
pub use tracing::init_tracing;
