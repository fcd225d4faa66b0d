//! One extract → transform → load chain for a single source.

use futures::FutureExt;
use snafu::prelude::*;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use sluice_core::emit;
use sluice_core::metrics::events::{ChainFinished, ChainStatus, Step, StepCompleted, StepFailed};
use sluice_core::storage::PartitionLease;
use sluice_core::{Chain, LeaseError};

use super::context::RunContext;
use crate::config::TransformFailurePolicy;
use crate::error::{
    ChainError, ExtractStepSnafu, LeaseAcquireSnafu, LoadStepSnafu, TransformStepSnafu,
};
use crate::extract::{ExtractStats, Extractor};
use crate::load::{LoadStats, Loader};
use crate::paths::ArtifactPaths;
use crate::source::Source;
use crate::transform::{TransformStats, Transformer};

/// Lifecycle of a chain.
///
/// `Pending → Extracting → Transforming → Loading → Done`, with `Failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainState::Pending => "pending",
            ChainState::Extracting => "extracting",
            ChainState::Transforming => "transforming",
            ChainState::Loading => "loading",
            ChainState::Done => "done",
            ChainState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Step results of a completed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    pub source: Source,
    pub extract: ExtractStats,
    /// `None` when the transform failed and the chain continued.
    pub transform: Option<TransformStats>,
    pub load: LoadStats,
}

/// Step implementations shared by every chain of a run.
pub(crate) struct Steps {
    pub extractor: Extractor,
    pub transformer: Transformer,
    pub loader: Loader,
    pub leases: Option<PartitionLease>,
    pub on_failure: TransformFailurePolicy,
}

pub(crate) struct EtlChain {
    source: Source,
    ctx: Arc<RunContext>,
    steps: Arc<Steps>,
}

impl EtlChain {
    pub(crate) fn new(source: Source, ctx: Arc<RunContext>, steps: Arc<Steps>) -> Self {
        Self { source, ctx, steps }
    }

    fn enter(&self, state: ChainState) {
        debug!(target = %self.source, state = %state, "Chain state change");
    }

    async fn execute(&self, paths: &ArtifactPaths) -> Result<ChainReport, ChainError> {
        let source = self.source;
        let steps = self.steps.clone();
        let ctx = self.ctx.clone();

        self.enter(ChainState::Extracting);
        let extract = timed(Step::Extract, source, steps.extractor.extract(source, &ctx))
            .await
            .context(ExtractStepSnafu)?;

        self.enter(ChainState::Transforming);
        let transformed = timed(
            Step::Transform,
            source,
            steps
                .transformer
                .transform(source, &ctx, &paths.staging, &paths.persisted),
        )
        .await;
        let transform = match transformed {
            Ok(stats) => Some(stats),
            Err(e) if steps.on_failure == TransformFailurePolicy::Continue => {
                warn!(
                    target = %source,
                    error = %e,
                    path = %paths.persisted,
                    "Transform failed, loading the artifact already at the persisted path"
                );
                None
            }
            Err(e) => return Err(e).context(TransformStepSnafu),
        };

        self.enter(ChainState::Loading);
        let load = timed(Step::Load, source, steps.loader.load(source, &paths.persisted))
            .await
            .context(LoadStepSnafu)?;

        self.enter(ChainState::Done);
        Ok(ChainReport {
            source,
            extract,
            transform,
            load,
        })
    }
}

impl Chain for EtlChain {
    type Key = Source;
    type Output = ChainReport;
    type Error = ChainError;

    fn key(&self) -> &Source {
        &self.source
    }

    async fn run(self) -> Result<ChainReport, ChainError> {
        let source = self.source;
        let paths = ArtifactPaths::new(source, &self.ctx.partition);

        info!(
            target = %source,
            partition = %self.ctx.partition,
            run_id = %self.ctx.run_id,
            "Starting chain"
        );

        let lease = match &self.steps.leases {
            Some(leases) => match leases.acquire(paths.lease.clone(), &self.ctx.run_id).await {
                Ok(lease) => Some(lease),
                Err(e) => {
                    let status = match &e {
                        LeaseError::Held { .. } => ChainStatus::Skipped,
                        _ => ChainStatus::Failed,
                    };
                    self.enter(ChainState::Failed);
                    emit!(ChainFinished {
                        status,
                        target: source.name().to_string(),
                    });
                    return Err(e).context(LeaseAcquireSnafu);
                }
            },
            None => None,
        };

        let outcome = AssertUnwindSafe(self.execute(&paths)).catch_unwind().await;

        if let Some(lease) = lease
            && let Err(e) = lease.release().await
        {
            warn!(target = %source, error = %e, "Failed to release partition lease");
        }

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                self.enter(ChainState::Failed);
                emit!(ChainFinished {
                    status: ChainStatus::Failed,
                    target: source.name().to_string(),
                });
                resume_unwind(panic);
            }
        };

        let status = match &result {
            Ok(_) => ChainStatus::Done,
            Err(e) => {
                error!(target = %source, state = %e.failed_state(), error = %e, "Chain failed");
                self.enter(ChainState::Failed);
                ChainStatus::Failed
            }
        };
        emit!(ChainFinished {
            status,
            target: source.name().to_string(),
        });

        result
    }
}

/// Await a step, recording its duration or failure.
async fn timed<T, E>(
    step: Step,
    source: Source,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let start = Instant::now();
    let result = fut.await;
    match &result {
        Ok(_) => emit!(StepCompleted {
            step,
            duration: start.elapsed(),
            target: source.name().to_string(),
        }),
        Err(_) => emit!(StepFailed {
            step,
            target: source.name().to_string(),
        }),
    }
    result
}
