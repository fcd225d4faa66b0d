//! Partition leases.
//!
//! A lease is a small JSON object created with a conditional put. Whoever
//! creates it owns the partition until it is released or its TTL runs out.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::UpdateVersion;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::time::Duration;
use tracing::{debug, warn};

use crate::emit;
use crate::error::{HeldSnafu, LeaseCodecSnafu, LeaseError, LeaseStorageSnafu};
use crate::metrics::events::LeaseContended;

use super::StorageProviderRef;

/// Contents of a lease object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

impl LeaseRecord {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.acquired_at);
        age.to_std().is_ok_and(|age| age >= ttl)
    }
}

/// Issues leases over object storage paths.
#[derive(Debug, Clone)]
pub struct PartitionLease {
    storage: StorageProviderRef,
    ttl: Duration,
}

/// A held lease. Dropping it without calling [`Lease::release`] leaves the
/// object in place until the TTL expires.
#[derive(Debug)]
pub struct Lease {
    storage: StorageProviderRef,
    path: Path,
    record: LeaseRecord,
}

impl PartitionLease {
    pub fn new(storage: StorageProviderRef, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// Acquire the lease at `path` for `owner`.
    ///
    /// An existing lease older than the TTL is treated as abandoned and
    /// replaced with a conditional overwrite, so two runs racing for the
    /// same stale lease cannot both win. A live lease held by anyone yields
    /// [`LeaseError::Held`].
    pub async fn acquire(&self, path: Path, owner: &str) -> Result<Lease, LeaseError> {
        // One retry covers a lease that expired or was released between our
        // create attempt and the read of the existing record.
        for _ in 0..2 {
            let record = LeaseRecord {
                owner: owner.to_string(),
                acquired_at: Utc::now(),
            };
            let body = Bytes::from(serde_json::to_vec(&record).context(LeaseCodecSnafu {
                path: path.to_string(),
            })?);

            match self.storage.put_if_absent(&path, body.clone()).await {
                Ok(()) => {
                    debug!(path = %path, owner, "Acquired partition lease");
                    return Ok(self.granted(path, record));
                }
                Err(e) if e.is_already_exists() => {}
                Err(e) => {
                    return Err(e).context(LeaseStorageSnafu {
                        path: path.to_string(),
                    });
                }
            }

            let (existing, version) = match self.read(&path).await? {
                Some(found) => found,
                None => continue,
            };

            if !existing.is_expired(self.ttl, Utc::now()) {
                emit!(LeaseContended {
                    target: path.to_string(),
                });
                return HeldSnafu {
                    path: path.to_string(),
                    owner: existing.owner,
                    acquired_at: existing.acquired_at.to_rfc3339(),
                }
                .fail();
            }

            warn!(
                path = %path,
                previous_owner = %existing.owner,
                acquired_at = %existing.acquired_at,
                "Taking over expired partition lease"
            );
            if self.take_over(&path, &existing, version, body).await? {
                return Ok(self.granted(path, record));
            }
        }

        let existing = self.read(&path).await?.map(|(record, _)| record);
        HeldSnafu {
            path: path.to_string(),
            owner: existing
                .as_ref()
                .map(|r| r.owner.clone())
                .unwrap_or_default(),
            acquired_at: existing
                .map(|r| r.acquired_at.to_rfc3339())
                .unwrap_or_default(),
        }
        .fail()
    }

    fn granted(&self, path: Path, record: LeaseRecord) -> Lease {
        Lease {
            storage: self.storage.clone(),
            path,
            record,
        }
    }

    /// Replace `stale` with `body` unless someone else got there first.
    ///
    /// Returns `false` when the lease changed since it was read.
    async fn take_over(
        &self,
        path: &Path,
        stale: &LeaseRecord,
        version: UpdateVersion,
        body: Bytes,
    ) -> Result<bool, LeaseError> {
        match self.storage.put_if_version(path, body.clone(), version).await {
            Ok(()) => return Ok(true),
            Err(e) if e.is_precondition_failed() || e.is_not_found() => return Ok(false),
            Err(e) if e.is_not_implemented() => {}
            Err(e) => {
                return Err(e).context(LeaseStorageSnafu {
                    path: path.to_string(),
                });
            }
        }

        // Local filesystem: no conditional update, so only clear the record
        // we judged stale and let the conditional create pick the winner.
        match self.read(path).await? {
            Some((current, _)) if current == *stale => self.remove(path).await?,
            Some(_) => return Ok(false),
            None => {}
        }
        match self.storage.put_if_absent(path, body).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e).context(LeaseStorageSnafu {
                path: path.to_string(),
            }),
        }
    }

    async fn read(
        &self,
        path: &Path,
    ) -> Result<Option<(LeaseRecord, UpdateVersion)>, LeaseError> {
        read_record(&self.storage, path).await
    }

    async fn remove(&self, path: &Path) -> Result<(), LeaseError> {
        match self.storage.delete(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e).context(LeaseStorageSnafu {
                path: path.to_string(),
            }),
        }
    }
}

async fn read_record(
    storage: &StorageProviderRef,
    path: &Path,
) -> Result<Option<(LeaseRecord, UpdateVersion)>, LeaseError> {
    match storage.get_versioned(path).await {
        Ok((bytes, version)) => {
            let record = serde_json::from_slice(&bytes).context(LeaseCodecSnafu {
                path: path.to_string(),
            })?;
            Ok(Some((record, version)))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e).context(LeaseStorageSnafu {
            path: path.to_string(),
        }),
    }
}

impl Lease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// Delete the lease object if it still belongs to this holder.
    ///
    /// A lease that expired and was taken over by another run is left alone.
    pub async fn release(self) -> Result<(), LeaseError> {
        match read_record(&self.storage, &self.path).await? {
            Some((current, _)) if current == self.record => {}
            Some((current, _)) => {
                warn!(
                    path = %self.path,
                    owner = %self.record.owner,
                    current_owner = %current.owner,
                    "Partition lease was taken over before release"
                );
                return Ok(());
            }
            None => return Ok(()),
        }

        match self.storage.delete(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path, "Released partition lease");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e).context(LeaseStorageSnafu {
                path: self.path.to_string(),
            }),
        }
    }
}
