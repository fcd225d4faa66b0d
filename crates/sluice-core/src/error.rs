//! Error types shared by the sluice crates.
//!
//! Storage, configuration, lease and metrics errors live here because every
//! pipeline step touches at least one of them.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }

    /// Check if a conditional create failed because the object already exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::AlreadyExists { .. })
            }
            _ => false,
        }
    }

    /// Check if a conditional update lost to another writer.
    pub fn is_precondition_failed(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::Precondition { .. })
            }
            _ => false,
        }
    }

    /// Check if the backend does not support the requested operation.
    pub fn is_not_implemented(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotImplemented)
            }
            _ => false,
        }
    }
}

// ============ Lease Errors ============

/// Errors raised while guarding a partition against overlapping runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LeaseError {
    /// Another run owns the partition.
    #[snafu(display("Partition lease {path} is held by {owner} since {acquired_at}"))]
    Held {
        path: String,
        owner: String,
        acquired_at: String,
    },

    /// Reading or writing the lease object failed.
    #[snafu(display("Lease storage error at {path}: {source}"))]
    LeaseStorage { path: String, source: StorageError },

    /// The lease object could not be encoded or decoded.
    #[snafu(display("Malformed lease record at {path}: {source}"))]
    LeaseCodec {
        path: String,
        source: serde_json::Error,
    },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A required URL is empty.
    #[snafu(display("'{field}' cannot be empty"))]
    EmptyUrl { field: String },

    /// A value failed validation.
    #[snafu(display("Invalid value for '{field}': {message}"))]
    InvalidValue { field: String, message: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse the metrics bind address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = StorageError::ObjectStore {
            source: object_store::Error::NotFound {
                path: "raw_data/account.csv".to_string(),
                source: "missing".into(),
            },
        };
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_already_exists_detection() {
        let err = StorageError::ObjectStore {
            source: object_store::Error::AlreadyExists {
                path: "_leases/account/lease.json".to_string(),
                source: "exists".into(),
            },
        };
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_lease_held_display() {
        let err = LeaseError::Held {
            path: "_leases/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/lease.json".to_string(),
            owner: "run-1".to_string(),
            acquired_at: "2024-03-05T21:00:00Z".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("run-1"));
        assert!(msg.contains("ptn_dd=5"));
    }
}
