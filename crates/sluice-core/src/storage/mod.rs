//! Object storage abstraction.
//!
//! Wraps an `object_store` backend (Google Cloud Storage or the local
//! filesystem) behind a provider that qualifies relative paths with the
//! configured key prefix and records request metrics.

mod gcs;
mod lease;
mod local;
mod url_parser;

pub use gcs::GcsConfig;
pub use lease::{Lease, LeaseRecord, PartitionLease};
pub use local::LocalConfig;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMode, PutOptions, PutPayload,
    UpdateVersion,
};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Content type of raw tabular exports.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Content type of persisted columnar artifacts.
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::Gcs(config) => Self::construct_gcs(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config, options).await,
        }
    }

    /// Create a shared provider for the given URL.
    pub async fn shared(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<StorageProviderRef, StorageError> {
        Ok(Arc::new(Self::for_url_with_options(url, options).await?))
    }

    /// The canonical URL of the storage root (used in log lines).
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Storage options for external integrations (e.g. Delta Lake).
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Get the contents of an object together with the version it was read at.
    pub async fn get_versioned(
        &self,
        path: &Path,
    ) -> Result<(Bytes, UpdateVersion), StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let result = result.context(ObjectStoreSnafu)?;
        let version = UpdateVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let bytes = result.bytes().await.context(ObjectStoreSnafu)?;
        Ok((bytes, version))
    }

    /// Put a payload to a path, replacing any existing object.
    pub async fn put(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        self.put_with_opts(path, PutPayload::from(bytes), PutOptions::default())
            .await
    }

    /// Put a CSV export, replacing any existing object.
    ///
    /// Sets `Content-Type: text/csv` on cloud storage backends.
    pub async fn put_csv(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        self.put_typed(path, bytes, CSV_CONTENT_TYPE).await
    }

    /// Put a Parquet file, replacing any existing object.
    ///
    /// Sets `Content-Type: application/vnd.apache.parquet` on cloud storage backends.
    pub async fn put_parquet(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        self.put_typed(path, bytes, PARQUET_CONTENT_TYPE).await
    }

    /// Create an object only if nothing exists at `path` yet.
    ///
    /// Fails with an `AlreadyExists` storage error otherwise
    /// (see [`StorageError::is_already_exists`]).
    pub async fn put_if_absent(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        self.put_with_opts(path, PutPayload::from(bytes), opts).await
    }

    /// Replace an object only if it is still at `version`.
    ///
    /// A concurrent writer surfaces as a `Precondition` storage error
    /// (see [`StorageError::is_precondition_failed`]). Backends without
    /// conditional updates report [`StorageError::is_not_implemented`].
    pub async fn put_if_version(
        &self,
        path: &Path,
        bytes: Bytes,
        version: UpdateVersion,
    ) -> Result<(), StorageError> {
        let opts = PutOptions {
            mode: PutMode::Update(version),
            ..Default::default()
        };
        self.put_with_opts(path, PutPayload::from(bytes), opts).await
    }

    /// Delete the object at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;

        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> StorageProviderRef {
        Arc::new(Self {
            config: BackendConfig::Local(LocalConfig {
                path: "memory".into(),
                key: None,
            }),
            object_store: Arc::new(object_store::memory::InMemory::new()),
            canonical_url: "memory://".to_string(),
            storage_options: HashMap::new(),
        })
    }

    async fn put_typed(
        &self,
        path: &Path,
        bytes: Bytes,
        content_type: &'static str,
    ) -> Result<(), StorageError> {
        // Local filesystem doesn't support content-type attributes
        if matches!(self.config, BackendConfig::Local(_)) {
            return self.put(path, bytes).await;
        }

        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from(content_type),
            )]),
            ..Default::default()
        };
        self.put_with_opts(path, PutPayload::from(bytes), opts).await
    }

    async fn put_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}
