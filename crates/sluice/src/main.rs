//! sluice CLI: daily document store to warehouse ETL.

use std::process::ExitCode;

use clap::Parser;

use sluice::{CliArgs, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    sluice::app::execute(args).await
}
