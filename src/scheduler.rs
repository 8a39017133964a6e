//! Recurring background runs
//!
//! Runs the orchestrator, hands each outcome to the caller and sleeps for
//! the check interval. Runs never overlap: the next one starts only after
//! the previous one returned.

use crate::orchestrator::{Orchestrator, RunOutcome};
use std::future::Future;
use std::time::Duration;

/// Periodic scheduler over an orchestrator
pub struct Scheduler<'a> {
    orchestrator: &'a Orchestrator,
    interval: Duration,
    max_runs: Option<usize>,
}

impl<'a> Scheduler<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self {
            orchestrator,
            interval: orchestrator.settings().check_interval,
            max_runs: None,
        }
    }

    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    /// Run until `shutdown` resolves or the run limit is reached
    ///
    /// Returns the number of completed runs.
    pub async fn run<F, S>(&self, mut on_outcome: F, shutdown: S) -> usize
    where
        F: FnMut(&RunOutcome),
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut runs = 0;

        loop {
            tokio::select! {
                outcome = self.orchestrator.run() => {
                    runs += 1;
                    on_outcome(&outcome);
                }
                _ = &mut shutdown => break,
            }

            if self.max_runs.is_some_and(|max| runs >= max) {
                break;
            }

            tracing::debug!(interval_secs = self.interval.as_secs(), "waiting for next run");
            tokio::select! {
                _ = self.orchestrator.clock().sleep(self.interval) => {}
                _ = &mut shutdown => break,
            }
        }
        runs
    }
}
