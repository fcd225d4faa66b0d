//! Concurrent execution of independent units of work.

mod runner;

pub use runner::{Chain, ChainOutcome, ChainRunner};
