//! Pipeline orchestration.
//!
//! A run resolves its [`RunContext`] once, then spawns one [`EtlChain`] per
//! source on the [`ChainRunner`]. Chains never wait on each other; inside a
//! chain the steps are sequential and the first failure stops it.

mod chain;
mod context;

pub use chain::{ChainReport, ChainState};
pub use context::RunContext;

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sluice_core::storage::{PartitionLease, StorageProvider, StorageProviderRef};
use sluice_core::{ChainOutcome, ChainRunner};

use crate::config::{Config, ParquetCompression, TransformFailurePolicy, WarehouseKind};
use crate::docstore::{self, DocumentStoreRef};
use crate::error::{ChainError, PipelineError, WarehouseSnafu};
use crate::extract::Extractor;
use crate::load::Loader;
use crate::partition::PartitionKey;
use crate::source::Source;
use crate::transform::Transformer;
use crate::warehouse::{DeltaWarehouse, MemoryWarehouse, WarehouseRef};

use chain::{EtlChain, Steps};

/// How one chain of a run ended.
pub type ChainResult = ChainOutcome<ChainReport, ChainError>;

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub partition: PartitionKey,
    /// One entry per chain, ordered by source.
    pub chains: Vec<(Source, ChainResult)>,
}

impl RunSummary {
    /// True when every chain completed.
    pub fn is_success(&self) -> bool {
        self.chains.iter().all(|(_, outcome)| outcome.is_completed())
    }

    pub fn outcome(&self, source: Source) -> Option<&ChainResult> {
        self.chains
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, outcome)| outcome)
    }

    pub fn report(&self, source: Source) -> Option<&ChainReport> {
        match self.outcome(source)? {
            ChainOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Sources whose chain did not complete.
    pub fn failed(&self) -> impl Iterator<Item = Source> + '_ {
        self.chains
            .iter()
            .filter(|(_, outcome)| !outcome.is_completed())
            .map(|(source, _)| *source)
    }
}

/// The account and transaction chains with their shared dependencies.
pub struct Pipeline {
    store: DocumentStoreRef,
    storage: StorageProviderRef,
    warehouse: WarehouseRef,
    compression: ParquetCompression,
    on_failure: TransformFailurePolicy,
    lease_ttl: Option<Duration>,
    sources: Vec<Source>,
}

impl Pipeline {
    /// A pipeline over every source with default settings and no leases.
    pub fn new(
        store: DocumentStoreRef,
        storage: StorageProviderRef,
        warehouse: WarehouseRef,
    ) -> Self {
        Self {
            store,
            storage,
            warehouse,
            compression: ParquetCompression::default(),
            on_failure: TransformFailurePolicy::default(),
            lease_ttl: None,
            sources: Source::ALL.to_vec(),
        }
    }

    /// Build the pipeline described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let storage =
            StorageProvider::shared(&config.storage.url, config.storage.options.clone()).await?;

        let store = docstore::open(
            &config.document_store.url,
            &config.document_store.database,
            config.document_store.options.clone(),
        );

        let warehouse: WarehouseRef = match config.warehouse.kind {
            WarehouseKind::Delta => Arc::new(
                DeltaWarehouse::new(&config.warehouse.url, config.warehouse.options.clone())
                    .await
                    .context(WarehouseSnafu)?,
            ),
            WarehouseKind::Memory => {
                warn!("Using the in-memory warehouse; loaded tables are discarded at exit");
                Arc::new(MemoryWarehouse::new())
            }
        };

        Ok(Self::new(store, storage, warehouse)
            .with_compression(config.transform.compression)
            .with_failure_policy(config.transform.on_failure)
            .with_lease_ttl(config.lease.enabled.then(|| config.lease.ttl())))
    }

    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_failure_policy(mut self, on_failure: TransformFailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Guard each partition with a lease of the given TTL, or not at all.
    pub fn with_lease_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Restrict the run to `sources`.
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Run every chain once for the partition in `ctx`.
    pub async fn run(&self, ctx: &RunContext) -> RunSummary {
        let ctx = Arc::new(ctx.clone());
        let steps = Arc::new(Steps {
            extractor: Extractor::new(self.store.clone(), self.storage.clone()),
            transformer: Transformer::new(self.storage.clone(), self.compression),
            loader: Loader::new(self.storage.clone(), self.warehouse.clone()),
            leases: self
                .lease_ttl
                .map(|ttl| PartitionLease::new(self.storage.clone(), ttl)),
            on_failure: self.on_failure,
        });

        info!(
            run_id = %ctx.run_id,
            partition = %ctx.partition,
            data_date = %ctx.data_date(),
            sources = self.sources.len(),
            "Starting run"
        );

        let chains = self
            .sources
            .iter()
            .map(|source| EtlChain::new(*source, ctx.clone(), steps.clone()))
            .collect();

        let mut chains = ChainRunner::new(chains, "chain").run().await;
        chains.sort_by_key(|(source, _)| *source);

        let summary = RunSummary {
            run_id: ctx.run_id.clone(),
            partition: ctx.partition,
            chains,
        };

        let failed: Vec<_> = summary.failed().map(|s| s.name()).collect();
        if failed.is_empty() {
            info!(run_id = %summary.run_id, partition = %summary.partition, "Run succeeded");
        } else {
            warn!(
                run_id = %summary.run_id,
                partition = %summary.partition,
                failed = ?failed,
                "Run finished with failed chains"
            );
        }

        summary
    }
}
