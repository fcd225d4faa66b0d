//! Internal events for sluice metrics emission.
//!
//! Each event struct represents a measurable occurrence in a pipeline run.
//! Events implement the `InternalEvent` trait which records the corresponding
//! Prometheus metric.
//!
//! ## Target Labels
//!
//! Per-source metrics carry a `target` label (e.g. `"account"`,
//! `"transaction"`) so each chain can be observed on its own.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Pipeline step events
// ============================================================================

/// The step of an extract/transform/load chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Extract,
    Transform,
    Load,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Extract => "extract",
            Step::Transform => "transform",
            Step::Load => "load",
        }
    }
}

/// Event emitted when a chain step finishes successfully.
pub struct StepCompleted {
    pub step: Step,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for StepCompleted {
    fn emit(self) {
        trace!(
            step = self.step.as_str(),
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Step completed"
        );
        histogram!(
            "sluice_step_duration_seconds",
            "step" => self.step.as_str(),
            "target" => self.target
        )
        .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a chain step fails.
pub struct StepFailed {
    pub step: Step,
    pub target: String,
}

impl InternalEvent for StepFailed {
    fn emit(self) {
        trace!(step = self.step.as_str(), target = %self.target, "Step failed");
        counter!(
            "sluice_step_failures_total",
            "step" => self.step.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// Event emitted when rows pass through a step.
pub struct RowsProcessed {
    pub step: Step,
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RowsProcessed {
    fn emit(self) {
        trace!(
            step = self.step.as_str(),
            count = self.count,
            target = %self.target,
            "Rows processed"
        );
        counter!(
            "sluice_rows_total",
            "step" => self.step.as_str(),
            "target" => self.target
        )
        .increment(self.count);
    }
}

/// Event emitted when an artifact is written to object storage.
pub struct BytesWritten {
    pub bytes: u64,
    pub target: String,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Bytes written");
        counter!("sluice_bytes_written_total", "target" => self.target).increment(self.bytes);
    }
}

/// Final state of a chain run.
#[derive(Debug, Clone, Copy)]
pub enum ChainStatus {
    Done,
    Failed,
    Skipped,
}

impl ChainStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Done => "done",
            ChainStatus::Failed => "failed",
            ChainStatus::Skipped => "skipped",
        }
    }
}

/// Event emitted when a chain reaches a terminal state.
pub struct ChainFinished {
    pub status: ChainStatus,
    pub target: String,
}

impl InternalEvent for ChainFinished {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "Chain finished");
        counter!(
            "sluice_chains_total",
            "status" => self.status.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// Event emitted when a partition lease is already owned by another run.
pub struct LeaseContended {
    pub target: String,
}

impl InternalEvent for LeaseContended {
    fn emit(self) {
        trace!(target = %self.target, "Lease contended");
        counter!("sluice_lease_contended_total", "target" => self.target).increment(1);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    Delete,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "sluice_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "sluice_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
