//! Process entry points behind the CLI.

use chrono::NaiveDate;
use snafu::prelude::*;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sluice_core::{init_metrics, shutdown_token};

use crate::cli::{CliArgs, Command};
use crate::config::Config;
use crate::error::{InvalidDateSnafu, MetricsSnafu, PipelineError};
use crate::partition::{Clock, FixedClock, SystemClock};
use crate::pipeline::{Pipeline, RunContext, RunSummary};
use crate::schedule::DailySchedule;
use crate::source::Source;

/// Parse a `--date` value.
pub fn parse_run_date(value: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").context(InvalidDateSnafu { value })
}

/// Run the chains once. `date` pins the partition; `source` restricts the run
/// to a single chain.
pub async fn run_once(
    config: &Config,
    date: Option<NaiveDate>,
    source: Option<Source>,
) -> Result<RunSummary, PipelineError> {
    let mut pipeline = Pipeline::from_config(config).await?;
    if let Some(source) = source {
        pipeline = pipeline.with_sources(vec![source]);
    }

    let clock: Arc<dyn Clock> = match date {
        Some(date) => Arc::new(FixedClock::new(date)),
        None => Arc::new(SystemClock),
    };
    let ctx = RunContext::new(clock).with_data_date(config.transform.data_date);

    Ok(pipeline.run(&ctx).await)
}

/// Run the chains every day at `schedule.daily_at` until `shutdown` fires.
pub async fn run_scheduled(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<(), PipelineError> {
    let schedule = DailySchedule::new(config.schedule.time()?);
    let pipeline = Pipeline::from_config(config).await?;
    let data_date = config.transform.data_date;

    info!(daily_at = %schedule.at(), "Scheduler started");

    let pipeline = &pipeline;
    schedule
        .run(shutdown, move || async move {
            let ctx = RunContext::new(Arc::new(SystemClock)).with_data_date(data_date);
            let summary = pipeline.run(&ctx).await;
            if !summary.is_success() {
                error!(run_id = %summary.run_id, "Scheduled run failed");
            }
        })
        .await;

    Ok(())
}

async fn dispatch(args: CliArgs) -> Result<bool, PipelineError> {
    info!(path = %args.config.display(), "Loading config");
    let config = Config::from_file(&args.config)?;

    if let Some(address) = &config.metrics.address {
        init_metrics(address).context(MetricsSnafu)?;
    }

    match args.command {
        Command::Run { date, source } => {
            let date = date.as_deref().map(parse_run_date).transpose()?;
            let source = source.as_deref().map(str::parse::<Source>).transpose()?;
            let summary = run_once(&config, date, source).await?;
            Ok(summary.is_success())
        }
        Command::Schedule => {
            run_scheduled(&config, shutdown_token()).await?;
            Ok(true)
        }
    }
}

/// Execute a parsed command line.
pub async fn execute(args: CliArgs) -> ExitCode {
    match dispatch(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("sluice failed: {e}");
            ExitCode::FAILURE
        }
    }
}
