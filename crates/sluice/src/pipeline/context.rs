//! Per-run context shared by every step of every chain.

use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DataDateSource;
use crate::partition::{Clock, PartitionKey};

/// Values fixed at the start of a run.
///
/// The partition key is resolved from the clock exactly once, here. Steps
/// receive it through this context and never consult the clock for it.
#[derive(Clone)]
pub struct RunContext {
    /// Unique per run; recorded as the lease owner.
    pub run_id: String,
    pub partition: PartitionKey,
    clock: Arc<dyn Clock>,
    data_date_source: DataDateSource,
}

impl RunContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let partition = PartitionKey::resolve(clock.as_ref());
        Self {
            run_id: Uuid::new_v4().to_string(),
            partition,
            clock,
            data_date_source: DataDateSource::default(),
        }
    }

    pub fn with_data_date(mut self, source: DataDateSource) -> Self {
        self.data_date_source = source;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Value of the `data_date` column.
    pub fn data_date(&self) -> NaiveDate {
        match self.data_date_source {
            DataDateSource::Partition => self
                .partition
                .date()
                .unwrap_or_else(|| self.clock.today()),
            DataDateSource::WallClock => self.clock.today(),
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("partition", &self.partition)
            .field("data_date_source", &self.data_date_source)
            .finish_non_exhaustive()
    }
}
