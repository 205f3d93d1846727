//! InfiniBand probe — perftest suite wrappers.
//!
//! perftest tools run their own rendezvous against a daemon on the target,
//! so unlike the Ethernet probe there is no listener to manage here.

use std::process::Command;
use std::time::Duration;

use fabricheck_common::models::FabricType;

use crate::parse;
use crate::process::run_with_timeout;
use crate::{MeasurementProbe, ProbeError, PROBE_TIMEOUT};

fn ib_send_lat_bin() -> String {
    std::env::var("FABRICHECK_IB_SEND_LAT_BIN").unwrap_or_else(|_| "ib_send_lat".to_string())
}

fn ib_send_bw_bin() -> String {
    std::env::var("FABRICHECK_IB_SEND_BW_BIN").unwrap_or_else(|_| "ib_send_bw".to_string())
}

pub struct InfinibandProbe {
    timeout: Duration,
}

impl InfinibandProbe {
    pub fn new() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl Default for InfinibandProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementProbe for InfinibandProbe {
    fn fabric(&self) -> FabricType {
        FabricType::Infiniband
    }

    /// t_avg in microseconds, field 5 of the summary row. ib_send_lat
    /// prints its result table on stderr.
    fn measure_latency(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError> {
        let mut cmd = Command::new(ib_send_lat_bin());
        cmd.args(["--bind_source_ip", source_ip, target_ip]);
        let out = run_with_timeout(&mut cmd, self.timeout)?;
        parse::last_line_field(&out.stderr, 5, "ib_send_lat")
    }

    /// 5-second duration run asked to print the bandwidth alone, in
    /// Gbits/sec.
    fn measure_bandwidth(&self, source_ip: &str, target_ip: &str) -> Result<f64, ProbeError> {
        let _ = source_ip; // rendezvous is addressed by target; source exclusivity is the engine's
        let mut cmd = Command::new(ib_send_bw_bin());
        cmd.args([
            target_ip,
            "-D5",
            "--output",
            "bandwidth",
            "--report_gbits",
            "-F",
        ]);
        let out = run_with_timeout(&mut cmd, self.timeout)?;
        parse::sole_number(&out.stdout, "ib_send_bw")
    }
}
