//! Runs independent chains side by side on a `JoinSet`.
//!
//! A chain never waits on another. Failures and panics are recorded against
//! the chain's key and never cancel the remaining chains.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{error, info};

/// A self-contained unit that runs to completion on its own task.
pub trait Chain: Send + 'static {
    /// Identifies the chain in logs and outcomes.
    type Key: Clone + Display + Send + 'static;

    /// Value produced by a successful run.
    type Output: Send + 'static;

    /// Error produced by a failed run.
    type Error: std::error::Error + Send + 'static;

    fn key(&self) -> &Self::Key;

    fn run(self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// How a single chain ended.
#[derive(Debug)]
pub enum ChainOutcome<O, E> {
    Completed(O),
    Failed(E),
    Panicked(String),
}

impl<O, E> ChainOutcome<O, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, ChainOutcome::Completed(_))
    }
}

/// Spawns every chain at once and collects their outcomes.
pub struct ChainRunner<C: Chain> {
    chains: Vec<C>,
    typetag: &'static str,
}

impl<C: Chain> ChainRunner<C> {
    /// `typetag` labels log lines (e.g. "chain").
    pub fn new(chains: Vec<C>, typetag: &'static str) -> Self {
        Self { chains, typetag }
    }

    /// Run all chains to completion.
    ///
    /// Outcomes are returned in completion order.
    #[allow(clippy::type_complexity)]
    pub async fn run(self) -> Vec<(C::Key, ChainOutcome<C::Output, C::Error>)> {
        let typetag = self.typetag;
        let mut handles: JoinSet<Result<C::Output, C::Error>> = JoinSet::new();
        let mut keys = HashMap::new();

        for chain in self.chains {
            let key = chain.key().clone();
            let handle = handles.spawn(chain.run());
            keys.insert(handle.id(), key);
        }

        info!("Spawned {} {} tasks", handles.len(), typetag);

        let mut outcomes = Vec::with_capacity(keys.len());
        while let Some(joined) = handles.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, Ok(output))) => (id, ChainOutcome::Completed(output)),
                Ok((id, Err(e))) => (id, ChainOutcome::Failed(e)),
                Err(e) => (e.id(), ChainOutcome::Panicked(e.to_string())),
            };

            let Some(key) = keys.remove(&id) else {
                continue;
            };

            match &outcome {
                ChainOutcome::Completed(_) => info!(target = %key, "{} completed", typetag),
                ChainOutcome::Failed(e) => error!(target = %key, error = %e, "{} failed", typetag),
                ChainOutcome::Panicked(msg) => {
                    error!(target = %key, error = %msg, "{} task panicked", typetag)
                }
            }
            outcomes.push((key, outcome));
        }

        info!("All {}s complete", typetag);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    enum Behaviour {
        Succeed(Duration),
        Fail,
        Panic,
    }

    struct TestChain {
        key: String,
        behaviour: Behaviour,
    }

    impl Chain for TestChain {
        type Key = String;
        type Output = usize;
        type Error = Boom;

        fn key(&self) -> &String {
            &self.key
        }

        async fn run(self) -> Result<usize, Boom> {
            match self.behaviour {
                Behaviour::Succeed(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(self.key.len())
                }
                Behaviour::Fail => Err(Boom),
                Behaviour::Panic => panic!("chain exploded"),
            }
        }
    }

    fn chain(key: &str, behaviour: Behaviour) -> TestChain {
        TestChain {
            key: key.to_string(),
            behaviour,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_chains() {
        let runner = ChainRunner::new(
            vec![
                chain("account", Behaviour::Fail),
                chain("transaction", Behaviour::Succeed(Duration::from_millis(20))),
            ],
            "chain",
        );

        let outcomes: HashMap<_, _> = runner.run().await.into_iter().collect();

        assert!(matches!(outcomes["account"], ChainOutcome::Failed(_)));
        assert!(matches!(outcomes["transaction"], ChainOutcome::Completed(11)));
    }

    #[tokio::test]
    async fn test_panic_is_attributed_to_its_chain() {
        let runner = ChainRunner::new(
            vec![
                chain("account", Behaviour::Panic),
                chain("transaction", Behaviour::Succeed(Duration::ZERO)),
            ],
            "chain",
        );

        let outcomes: HashMap<_, _> = runner.run().await.into_iter().collect();

        match &outcomes["account"] {
            ChainOutcome::Panicked(msg) => assert!(msg.contains("panic")),
            other => panic!("expected panic outcome, got {other:?}"),
        }
        assert!(outcomes["transaction"].is_completed());
    }

    #[tokio::test]
    async fn test_empty_runner() {
        let runner: ChainRunner<TestChain> = ChainRunner::new(Vec::new(), "chain");
        assert!(runner.run().await.is_empty());
    }
}
