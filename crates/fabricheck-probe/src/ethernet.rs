//! Ethernet probe — iperf client/server pairs.
//!
//! Both measurements need a server-side listener bound to the target IP for
//! the duration of the client run. The listener is a [`ScopedChild`], so it
//! is killed and reaped on every exit path, including client failures.

use std::process::Command;
use std::time::Duration;

use fabricheck_common::models::FabricType;

use crate::parse;
use crate::process::{run_with_timeout, ScopedChild};
use crate::{MeasurementProbe, ProbeError, PROBE_TIMEOUT};

/// iperf binary, overridable for hosts that install it off the PATH.
fn iperf_bin() -> String {
    std::env::var("FABRICHECK_IPERF_BIN").unwrap_or_else(|_| "iperf".to_string())
}

pub struct EthernetProbe {
    timeout: Duration,
}

impl EthernetProbe {
    pub fn new() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }

    fn listener(&self, target_ip: &str) -> Result<ScopedChild, ProbeError> {
        let mut cmd = Command::new(iperf_bin());
        cmd.args(["-s", "-u", "-B", target_ip]);
        ScopedChild::spawn(&mut cmd)
    }
}

impl Default for EthernetProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementProbe for EthernetProbe {
    fn fabric(&self) -> FabricType {
        FabricType::Ethernet
    }

    /// UDP round: jitter in milliseconds, field 8 of the server report row.
    fn measure_latency(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError> {
        let _listener = self.listener(target_ip)?;
        let mut cmd = Command::new(iperf_bin());
        cmd.args(["-c", target_ip, "-u", "-B", source_ip, "-b", "5M", "-t", "1"]);
        let out = run_with_timeout(&mut cmd, self.timeout)?;
        parse::last_line_field(&out.stdout, 8, "iperf")
    }

    /// 32-stream run: aggregate Gbits/sec, field 5 after the `SUM` marker.
    fn measure_bandwidth(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError> {
        let _ = source_ip; // iperf picks the route; the engine still owns the source lock
        let _listener = self.listener(target_ip)?;
        let mut cmd = Command::new(iperf_bin());
        cmd.args(["-c", target_ip, "-P", "32", "-t", "5", "-f", "g"]);
        let out = run_with_timeout(&mut cmd, self.timeout)?;
        parse::field_after_marker(&out.stdout, "SUM", 5, "iperf")
    }
}
