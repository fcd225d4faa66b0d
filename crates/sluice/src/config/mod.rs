//! Configuration for the sluice pipeline.
//!
//! ```yaml
//! storage:
//!   url: gs://analytics-staging/etl
//! document_store:
//!   url: gs://analytics-dumps/mongo   # or mongodb://host:27017
//!   database: sample_analytics
//! warehouse:
//!   url: gs://analytics-warehouse
//! transform:
//!   compression: snappy
//!   data_date: partition
//!   on_failure: abort
//! schedule:
//!   daily_at: "21:00"
//! lease:
//!   ttl_secs: 21600
//! metrics:
//!   address: 0.0.0.0:9090
//! ```

use chrono::NaiveTime;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use sluice_core::config::{load_yaml_file, parse_yaml, require_non_empty};
use sluice_core::error::InvalidValueSnafu;

use crate::error::ConfigError;

/// Format accepted by `schedule.daily_at`.
pub const DAILY_AT_FORMAT: &str = "%H:%M";

/// Staging area for raw exports and Parquet artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root URL (gs://bucket/prefix or a local path).
    pub url: String,
    /// Backend options (credentials, endpoints).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Location of the collection dumps read by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentStoreConfig {
    /// Root URL holding `{database}/{collection}.json` dumps.
    pub url: String,
    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Backend options (credentials, endpoints).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_database() -> String {
    "sample_analytics".to_string()
}

/// Warehouse implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    /// Delta Lake tables under `url`.
    #[default]
    Delta,
    /// In-process tables, discarded at exit.
    Memory,
}

/// Destination warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub kind: WarehouseKind,
    /// Root URL of the Delta tables. Required for `delta`.
    #[serde(default)]
    pub url: String,
    /// Backend options (credentials, endpoints).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl ParquetCompression {
    pub fn codec(self) -> Compression {
        match self {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4_RAW,
        }
    }
}

/// Which date fills the `data_date` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDateSource {
    /// The run's partition date.
    #[default]
    Partition,
    /// The clock's date when the transform runs.
    WallClock,
}

/// What a chain does when its transform step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformFailurePolicy {
    /// Fail the chain.
    #[default]
    Abort,
    /// Log the failure and load whatever artifact is already persisted.
    Continue,
}

/// Transform step settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub compression: ParquetCompression,
    #[serde(default)]
    pub data_date: DataDateSource,
    #[serde(default)]
    pub on_failure: TransformFailurePolicy,
}

/// Daily trigger for `sluice schedule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Local wall-clock time, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
        }
    }
}

impl ScheduleConfig {
    /// The parsed trigger time.
    pub fn time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.daily_at, DAILY_AT_FORMAT).map_err(|e| {
            ConfigError::InvalidValue {
                field: "schedule.daily_at".to_string(),
                message: format!("'{}' is not HH:MM ({e})", self.daily_at),
            }
        })
    }
}

fn default_daily_at() -> String {
    "21:00".to_string()
}

/// Partition lease settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_enabled")]
    pub enabled: bool,
    /// Age after which a lease counts as abandoned.
    #[serde(default = "default_lease_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            enabled: default_lease_enabled(),
            ttl_secs: default_lease_ttl_secs(),
        }
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_lease_enabled() -> bool {
    true
}

fn default_lease_ttl_secs() -> u64 {
    6 * 60 * 60
}

/// Prometheus endpoint. Disabled when `address` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub address: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub document_store: DocumentStoreConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Config = load_yaml_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("storage.url", &self.storage.url)?;
        require_non_empty("document_store.url", &self.document_store.url)?;
        require_non_empty("document_store.database", &self.document_store.database)?;
        if self.warehouse.kind == WarehouseKind::Delta {
            require_non_empty("warehouse.url", &self.warehouse.url)?;
        }

        self.schedule.time()?;

        ensure!(
            self.lease.ttl_secs > 0,
            InvalidValueSnafu {
                field: "lease.ttl_secs",
                message: "must be greater than zero",
            }
        );

        if let Some(address) = &self.metrics.address {
            ensure!(
                address.parse::<std::net::SocketAddr>().is_ok(),
                InvalidValueSnafu {
                    field: "metrics.address",
                    message: format!("'{address}' is not a socket address"),
                }
            );
        }

        Ok(())
    }
}
