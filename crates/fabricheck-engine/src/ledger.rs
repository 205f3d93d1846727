//! Degraded-connection ledger.
//!
//! An append-only record of connections that violated their thresholds,
//! persisted as a single JSON document. Several orchestration processes may
//! share one ledger path, so every `record` call runs a read-modify-write
//! cycle under an exclusive advisory lock on a sidecar file, and the
//! document is replaced via temp-file-then-rename so a crash mid-write
//! leaves the previous document intact.
//!
//! Each call rewrites the whole document, so write cost grows with the
//! accumulated record count. Fine at rack scale; not meant for unbounded
//! history.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use fabricheck_common::models::{
    BandwidthRecord, ConnectionRecord, LatencyRecord, LedgerDocument, TestOutcome, TestPair,
    ThresholdConfig,
};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("ledger document {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ── Ledger ──────────────────────────────────────────────────────────

/// Handle to a persisted ledger document. Cheap to construct; all I/O and
/// locking happens inside [`record`](Self::record).
pub struct ResultsLedger {
    path: PathBuf,
    lock_path: PathBuf,
}

impl ResultsLedger {
    /// `path` is the JSON document; the sidecar advisory lock lives at
    /// `<path>.lock`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one test outcome.
    ///
    /// Under the cross-process lock: load the persisted document (or start
    /// from the default if none exists), append a connection record iff the
    /// outcome completed and violated its thresholds, and rewrite the
    /// document. Safe to call concurrently from multiple processes sharing
    /// the ledger path.
    pub fn record(
        &self,
        pair: &TestPair,
        outcome: &TestOutcome,
        thresholds: &ThresholdConfig,
    ) -> Result<(), LedgerError> {
        let _lock = FileLock::exclusive(&self.lock_path)?;

        let mut doc = self.load_unlocked()?;

        if let TestOutcome::Success {
            latency,
            bandwidth,
            meets_thresholds: false,
        } = outcome
        {
            doc.connections
                .push(build_record(pair, *latency, *bandwidth, thresholds));
            tracing::info!(
                source = %pair.source.ip,
                target = %pair.target.ip,
                fabric = %pair.fabric,
                bandwidth,
                expected_speed = thresholds.speed,
                "degraded connection recorded"
            );
        }

        self.persist(&doc)
    }

    /// Read the current persisted document, or the default document if the
    /// file does not exist yet. Takes the cross-process lock for the read.
    pub fn load(&self) -> Result<LedgerDocument, LedgerError> {
        let _lock = FileLock::exclusive(&self.lock_path)?;
        self.load_unlocked()
    }

    fn load_unlocked(&self) -> Result<LedgerDocument, LedgerError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerDocument::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&text).map_err(|source| LedgerError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Rewrite the document: serialize to a temp file next to the target,
    /// fsync, then rename over it. Callers must hold the file lock.
    fn persist(&self, doc: &LedgerDocument) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(doc).map_err(|source| LedgerError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let write = || -> io::Result<()> {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(json.as_bytes())?;
            tmp.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        };
        write().map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn build_record(
    pair: &TestPair,
    latency: f64,
    bandwidth: f64,
    thresholds: &ThresholdConfig,
) -> ConnectionRecord {
    ConnectionRecord {
        source_ip: pair.source.ip.clone(),
        target_ip: pair.target.ip.clone(),
        fabric: pair.fabric,
        timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        bandwidth: BandwidthRecord {
            expected_speed: thresholds.speed,
            actual_speed: bandwidth,
            units: thresholds.speed_units.clone(),
            degradation_percentage: (thresholds.speed - bandwidth) / thresholds.speed * 100.0,
        },
        latency: LatencyRecord {
            lat: latency,
            units: thresholds.latency_units.clone(),
        },
    }
}

// ── Cross-process file lock ─────────────────────────────────────────

/// Exclusive advisory `flock` on a sidecar file, held for the guard's
/// lifetime. Advisory locks are per open file description, so every caller
/// opens its own descriptor — that makes the same primitive serialize both
/// threads within a process and independent processes.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn exclusive(path: &Path) -> Result<Self, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LedgerError::Io {
                path: path.display().to_string(),
                source,
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            // SAFETY: flock is a standard POSIX call; fd is a valid
            // descriptor owned by `file` for the duration of the call.
            let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if rc != 0 {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source: io::Error::last_os_error(),
                });
            }
        }

        Ok(Self { _file: file })
    }
}

// The lock is released when `_file` closes on drop.

#[cfg(test)]
mod tests {
    use super::*;
    use fabricheck_common::models::{FabricType, Server};

    fn server(ip: &str) -> Server {
        Server {
            rack: "rack-a".into(),
            hostname: format!("host-{ip}"),
            ip: ip.into(),
        }
    }

    fn pair(source: &str, target: &str) -> TestPair {
        TestPair {
            source: server(source),
            target: server(target),
            fabric: FabricType::Ethernet,
        }
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig {
            speed: 100.0,
            speed_units: "Gbits/sec".into(),
            latency: 0.1,
            latency_units: "ms".into(),
        }
    }

    fn failing_outcome(bandwidth: f64) -> TestOutcome {
        TestOutcome::Success {
            latency: 0.2,
            bandwidth,
            meets_thresholds: false,
        }
    }

    #[test]
    fn failing_outcome_appends_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("results.json"));

        ledger
            .record(
                &pair("192.168.1.1", "192.168.1.2"),
                &failing_outcome(80.0),
                &thresholds(),
            )
            .unwrap();

        let doc = ledger.load().unwrap();
        assert_eq!(doc.connections.len(), 1);
        let record = &doc.connections[0];
        assert_eq!(record.source_ip, "192.168.1.1");
        assert_eq!(record.target_ip, "192.168.1.2");
        assert_eq!(record.fabric, FabricType::Ethernet);
        assert_eq!(record.bandwidth.expected_speed, 100.0);
        assert_eq!(record.bandwidth.actual_speed, 80.0);
        assert_eq!(record.bandwidth.degradation_percentage, 20.0);
        assert_eq!(record.latency.lat, 0.2);
        assert_eq!(record.latency.units, "ms");
    }

    #[test]
    fn passing_and_incomplete_outcomes_write_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("results.json"));
        let p = pair("192.168.1.1", "192.168.1.2");

        let outcomes = [
            TestOutcome::Success {
                latency: 0.05,
                bandwidth: 99.0,
                meets_thresholds: true,
            },
            TestOutcome::Skipped {
                reason: "source busy".into(),
            },
            TestOutcome::Failed {
                error: "iperf timed out after 30s".into(),
            },
        ];
        for outcome in &outcomes {
            ledger.record(&p, outcome, &thresholds()).unwrap();
        }

        // The document was still created, with metadata but no connections.
        let doc = ledger.load().unwrap();
        assert!(doc.connections.is_empty());
        assert_eq!(doc.datacenter.ethernet.fabric_type, "Gigabit Ethernet");
        assert!(ledger.path().exists());
    }

    #[test]
    fn records_accumulate_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("results.json"));

        ledger
            .record(
                &pair("10.0.0.1", "10.0.0.2"),
                &failing_outcome(80.0),
                &thresholds(),
            )
            .unwrap();
        ledger
            .record(
                &pair("10.0.0.2", "10.0.0.3"),
                &failing_outcome(50.0),
                &thresholds(),
            )
            .unwrap();

        let doc = ledger.load().unwrap();
        assert_eq!(doc.connections.len(), 2);
        assert_eq!(doc.connections[0].source_ip, "10.0.0.1");
        assert_eq!(doc.connections[1].source_ip, "10.0.0.2");
        assert_eq!(doc.connections[1].bandwidth.degradation_percentage, 50.0);
    }

    #[test]
    fn degradation_can_be_negative_when_actual_exceeds_expected() {
        // Latency violations record even when bandwidth beat the threshold.
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("results.json"));

        ledger
            .record(
                &pair("10.0.0.1", "10.0.0.2"),
                &TestOutcome::Success {
                    latency: 5.0,
                    bandwidth: 110.0,
                    meets_thresholds: false,
                },
                &thresholds(),
            )
            .unwrap();

        let doc = ledger.load().unwrap();
        let degradation = doc.connections[0].bandwidth.degradation_percentage;
        assert!((degradation - -10.0).abs() < 1e-9, "got {degradation}");
    }

    #[test]
    fn corrupt_document_is_reported_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{ not json").unwrap();

        let ledger = ResultsLedger::new(&path);
        let err = ledger
            .record(
                &pair("10.0.0.1", "10.0.0.2"),
                &failing_outcome(80.0),
                &thresholds(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        // The broken file is left as-is for inspection.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn persisted_json_matches_the_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let ledger = ResultsLedger::new(&path);
        ledger
            .record(
                &pair("192.168.1.1", "192.168.1.2"),
                &failing_outcome(80.0),
                &thresholds(),
            )
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["datacenter"]["infiniband"]["version"], "v4.0");
        let connection = &json["connections"][0];
        assert_eq!(connection["rack_1"], "192.168.1.1");
        assert_eq!(connection["rack_2"], "192.168.1.2");
        assert_eq!(connection["type"], "ethernet");
        assert_eq!(connection["BW"]["degradation_percentage"], 20.0);
        assert_eq!(connection["latency"]["lat"], 0.2);
        // Timestamp shape: "YYYY-MM-DD HH:MM:SS".
        let ts = connection["timestamp"].as_str().unwrap();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }
}
