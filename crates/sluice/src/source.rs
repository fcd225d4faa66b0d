//! The fixed set of collections moved by the pipeline.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, UnknownSourceSnafu};

/// A source collection and everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Account,
    Transaction,
}

impl Source {
    /// Every source, in the order chains are spawned.
    pub const ALL: [Source; 2] = [Source::Transaction, Source::Account];

    /// Name used in storage paths and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Account => "account",
            Source::Transaction => "transaction",
        }
    }

    /// Collection in the document store.
    pub fn collection(&self) -> &'static str {
        match self {
            Source::Account => "accounts",
            Source::Transaction => "transactions",
        }
    }

    /// Destination warehouse table, `dataset.table`.
    pub fn table(&self) -> &'static str {
        match self {
            Source::Account => "datalake.account_csv",
            Source::Transaction => "datalake.transaction_csv",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" | "accounts" => Ok(Source::Account),
            "transaction" | "transactions" => Ok(Source::Transaction),
            other => UnknownSourceSnafu { name: other }.fail(),
        }
    }
}
