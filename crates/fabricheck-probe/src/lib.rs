//! External measurement probes.
//!
//! Each fabric type gets one [`MeasurementProbe`] implementation that wraps
//! the fabric's external measurement tools:
//!
//! - **Ethernet** — `iperf` (UDP jitter for latency, 32-stream TCP for
//!   bandwidth), with a server-side listener spawned against the target IP
//!   for the duration of each client run
//! - **InfiniBand** — `ib_send_lat` / `ib_send_bw` from the perftest suite
//!
//! Probes bind to the source IP, so callers must guarantee that no two
//! concurrent measurements share a source endpoint. That guarantee lives in
//! the engine, not here.
//!
//! Every invocation is bounded by [`PROBE_TIMEOUT`]; the numeric result is
//! extracted from the tool's text output by a fixed token-position rule
//! (see [`parse`]). Anything else surfaces as a [`ProbeError`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use fabricheck_common::models::FabricType;

mod ethernet;
mod infiniband;
mod parse;
mod process;

pub use ethernet::EthernetProbe;
pub use infiniband::InfinibandProbe;

/// Wall-clock bound for a single external measurement process.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{tool} timed out after {}s", timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },
    #[error("{tool} failed: {reason}")]
    ProcessFailure { tool: String, reason: String },
    #[error("unexpected {tool} output: {reason}")]
    ParseFailure { tool: String, reason: String },
}

// ── Probe contract ──────────────────────────────────────────────────

/// A latency/bandwidth measurement backend for one fabric type.
///
/// Results are floats in the fabric's native units: iperf reports jitter in
/// milliseconds and bandwidth in Gbits/sec (`-f g`); perftest reports
/// average latency in microseconds and bandwidth in Gbits/sec
/// (`--report_gbits`).
pub trait MeasurementProbe: Send + Sync {
    fn fabric(&self) -> FabricType;

    /// Measure latency from `source_ip` to `target_ip`.
    fn measure_latency(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError>;

    /// Measure bandwidth from `source_ip` to `target_ip`.
    fn measure_bandwidth(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError>;
}

/// Build the probe for a fabric type.
pub fn for_fabric(fabric: FabricType) -> Arc<dyn MeasurementProbe> {
    match fabric {
        FabricType::Ethernet => Arc::new(EthernetProbe::new()),
        FabricType::Infiniband => Arc::new(InfinibandProbe::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_matches_fabric() {
        assert_eq!(
            for_fabric(FabricType::Ethernet).fabric(),
            FabricType::Ethernet
        );
        assert_eq!(
            for_fabric(FabricType::Infiniband).fabric(),
            FabricType::Infiniband
        );
    }
}
