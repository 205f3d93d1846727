//! Single-pair test execution.
//!
//! A [`PairTester`] runs the latency → bandwidth measurement sequence for
//! one source/target pair. It owns the pair's source lock for the duration
//! of both measurements, retries each measurement with linear backoff, and
//! validates the results against the fabric's thresholds.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fabricheck_common::models::{TestOutcome, TestPair, ThresholdConfig};
use fabricheck_probe::{MeasurementProbe, ProbeError};

use crate::lock::{SourceGuard, SourceLockManager};

/// Attempts per measurement phase before the pair is reported failed.
pub const MAX_MEASUREMENT_ATTEMPTS: u32 = 3;

/// Bandwidth must reach this fraction of the expected speed to pass.
pub const BANDWIDTH_MARGIN: f64 = 0.95;

/// Executes one pair test. One-shot: `run` consumes the tester.
pub struct PairTester {
    pair: TestPair,
    thresholds: ThresholdConfig,
    locks: Arc<SourceLockManager>,
    probe: Arc<dyn MeasurementProbe>,
    backoff_unit: Duration,
}

impl PairTester {
    pub fn new(
        pair: TestPair,
        thresholds: ThresholdConfig,
        locks: Arc<SourceLockManager>,
        probe: Arc<dyn MeasurementProbe>,
    ) -> Self {
        Self {
            pair,
            thresholds,
            locks,
            probe,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Override the retry backoff unit. Production uses the 1 s default;
    /// tests shrink it to milliseconds.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Execute the test: claim the source, measure latency then bandwidth,
    /// validate against thresholds. The source lock is released on every
    /// exit path when the guard drops.
    pub fn run(self) -> TestOutcome {
        let source_ip = self.pair.source.ip.as_str();
        let target_ip = self.pair.target.ip.as_str();

        let Some(_guard) = SourceGuard::acquire(&self.locks, source_ip) else {
            tracing::warn!(source = %source_ip, "source already running a test, skipping pair");
            return TestOutcome::Skipped {
                reason: "source busy".into(),
            };
        };

        let latency = match self.with_retries("latency", || {
            self.probe.measure_latency(source_ip, target_ip)
        }) {
            Ok(v) => v,
            Err(e) => return self.failed(e),
        };

        let bandwidth = match self.with_retries("bandwidth", || {
            self.probe.measure_bandwidth(source_ip, target_ip)
        }) {
            Ok(v) => v,
            Err(e) => return self.failed(e),
        };

        let meets_thresholds = bandwidth >= BANDWIDTH_MARGIN * self.thresholds.speed
            && latency <= self.thresholds.latency;

        if meets_thresholds {
            tracing::debug!(
                source = %source_ip,
                target = %target_ip,
                latency,
                bandwidth,
                "pair within thresholds"
            );
        } else {
            tracing::warn!(
                source = %source_ip,
                target = %target_ip,
                latency,
                bandwidth,
                expected_speed = self.thresholds.speed,
                "pair violates thresholds"
            );
        }

        TestOutcome::Success {
            latency,
            bandwidth,
            meets_thresholds,
        }
    }

    /// Run one measurement up to [`MAX_MEASUREMENT_ATTEMPTS`] times,
    /// sleeping `attempt × backoff_unit` between attempts. The last error
    /// is the one surfaced.
    fn with_retries<F>(&self, what: &str, mut measure: F) -> Result<f64, ProbeError>
    where
        F: FnMut() -> Result<f64, ProbeError>,
    {
        let mut attempt = 1;
        loop {
            match measure() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_MEASUREMENT_ATTEMPTS => {
                    tracing::warn!(
                        source = %self.pair.source.ip,
                        target = %self.pair.target.ip,
                        attempt,
                        error = %e,
                        "{what} measurement failed, retrying"
                    );
                    thread::sleep(self.backoff_unit * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn failed(&self, error: ProbeError) -> TestOutcome {
        tracing::error!(
            source = %self.pair.source.ip,
            target = %self.pair.target.ip,
            error = %error,
            "pair test failed"
        );
        TestOutcome::Failed {
            error: error.to_string(),
        }
    }
}
