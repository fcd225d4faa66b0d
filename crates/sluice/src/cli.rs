//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run every chain once and exit
    Run {
        /// Partition date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Run only this source's chain (account or transaction)
        #[arg(long)]
        source: Option<String>,
    },

    /// Run daily at `schedule.daily_at` until interrupted
    Schedule,
}
