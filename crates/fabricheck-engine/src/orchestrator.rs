//! Batch fan-out across a bounded worker pool.
//!
//! One batch covers one fabric. Pairs are distributed over
//! `min(max_workers, pairs)` worker threads through a crossbeam job
//! channel; workers push `(pair, outcome)` into a results channel, and the
//! orchestrating thread drains it in completion order, forwarding
//! threshold-violating outcomes to the ledger as they arrive.
//!
//! A pair's failure or skip never aborts the batch. Skipped pairs are not
//! resubmitted — the source lock deliberately rejects rather than queues,
//! and the returned outcome list lets a caller re-run exactly the pairs it
//! cares about. Only a ledger storage error aborts: the results receiver
//! is dropped, workers exit on their next send, and the error propagates.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded};

use fabricheck_common::models::{TestOutcome, TestPair, ThresholdConfig};
use fabricheck_probe::MeasurementProbe;

use crate::ledger::{LedgerError, ResultsLedger};
use crate::lock::SourceLockManager;
use crate::tester::PairTester;

/// Default degree of parallelism for a batch.
pub const DEFAULT_MAX_WORKERS: usize = 10;

pub struct BatchOrchestrator {
    max_workers: usize,
    backoff_unit: Duration,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchOrchestrator {
    pub fn new() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Bound the worker pool. A bound of 0 is clamped to 1.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Override the per-pair retry backoff unit (see [`PairTester`]).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Test every pair in the batch, forwarding threshold violations to the
    /// ledger. Returns all outcomes in completion order.
    pub fn run_batch(
        &self,
        pairs: Vec<TestPair>,
        thresholds: &ThresholdConfig,
        probe: Arc<dyn MeasurementProbe>,
        ledger: &ResultsLedger,
    ) -> Result<Vec<(TestPair, TestOutcome)>, LedgerError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let total = pairs.len();
        let locks = Arc::new(SourceLockManager::new());
        let (job_tx, job_rx) = unbounded::<TestPair>();
        let (result_tx, result_rx) = bounded::<(TestPair, TestOutcome)>(total);

        for pair in pairs {
            // Receiver is alive in this scope; the send cannot fail.
            let _ = job_tx.send(pair);
        }
        drop(job_tx);

        let workers = self.max_workers.min(total);
        tracing::info!(pairs = total, workers, "starting batch");

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let locks = Arc::clone(&locks);
            let probe = Arc::clone(&probe);
            let thresholds = thresholds.clone();
            let backoff_unit = self.backoff_unit;

            let handle = thread::Builder::new()
                .name(format!("pair-test-{i}"))
                .spawn(move || {
                    while let Ok(pair) = job_rx.recv() {
                        let outcome = PairTester::new(
                            pair.clone(),
                            thresholds.clone(),
                            Arc::clone(&locks),
                            Arc::clone(&probe),
                        )
                        .with_backoff_unit(backoff_unit)
                        .run();
                        // A closed results channel means the batch aborted.
                        if result_tx.send((pair, outcome)).is_err() {
                            break;
                        }
                    }
                })
                .expect("failed to spawn pair-test worker");
            handles.push(handle);
        }
        drop(result_tx);
        drop(job_rx);

        let mut outcomes: Vec<(TestPair, TestOutcome)> = Vec::with_capacity(total);
        let mut abort = None;
        while let Ok((pair, outcome)) = result_rx.recv() {
            if outcome.violates_thresholds() {
                if let Err(e) = ledger.record(&pair, &outcome, thresholds) {
                    tracing::error!(error = %e, "ledger write failed, aborting batch");
                    abort = Some(e);
                    break;
                }
            }
            outcomes.push((pair, outcome));
        }
        drop(result_rx);

        for handle in handles {
            let _ = handle.join();
        }

        if let Some(e) = abort {
            return Err(e);
        }

        let (mut passed, mut violated, mut skipped, mut failed) = (0, 0, 0, 0);
        for (_, outcome) in &outcomes {
            match outcome {
                TestOutcome::Success {
                    meets_thresholds: true,
                    ..
                } => passed += 1,
                TestOutcome::Success { .. } => violated += 1,
                TestOutcome::Skipped { .. } => skipped += 1,
                TestOutcome::Failed { .. } => failed += 1,
            }
        }
        tracing::info!(passed, violated, skipped, failed, "batch complete");

        Ok(outcomes)
    }
}
