//! Object storage layout for a `(source, partition)` pair.

use object_store::path::Path;

use crate::partition::PartitionKey;
use crate::source::Source;

const STAGING_ROOT: &str = "raw_data";
const PERSISTED_ROOT: &str = "persist_data";
const LEASE_ROOT: &str = "_leases";

/// Where each artifact of one chain lives.
///
/// ```text
/// raw_data/{source}/ptn_yyyy={Y}/ptn_mm={M}/ptn_dd={D}/{source}_extract.csv
/// persist_data/{source}/ptn_yyyy={Y}/ptn_mm={M}/ptn_dd={D}/{source}.parquet
/// _leases/{source}/ptn_yyyy={Y}/ptn_mm={M}/ptn_dd={D}/lease.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub staging: Path,
    pub persisted: Path,
    pub lease: Path,
}

impl ArtifactPaths {
    pub fn new(source: Source, key: &PartitionKey) -> Self {
        let name = source.name();
        Self {
            staging: Path::from(format!("{STAGING_ROOT}/{name}/{key}/{name}_extract.csv")),
            persisted: Path::from(format!("{PERSISTED_ROOT}/{name}/{key}/{name}.parquet")),
            lease: Path::from(format!("{LEASE_ROOT}/{name}/{key}/lease.json")),
        }
    }
}
