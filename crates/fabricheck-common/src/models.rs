//! Data models for the Fabricheck platform.
//!
//! These types are shared between the configuration loader (which produces
//! them), the test engine (which consumes them), and the results ledger
//! (which persists a subset of them as JSON).

use serde::{Deserialize, Serialize};

// ── Fabric ──────────────────────────────────────────────────────────

/// Network technology under test. Each fabric has its own probe
/// implementation and measurement units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FabricType {
    Ethernet,
    Infiniband,
}

impl std::fmt::Display for FabricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FabricType::Ethernet => write!(f, "ethernet"),
            FabricType::Infiniband => write!(f, "infiniband"),
        }
    }
}

impl std::str::FromStr for FabricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethernet" => Ok(FabricType::Ethernet),
            "infiniband" => Ok(FabricType::Infiniband),
            other => Err(format!("unknown fabric type: {other}")),
        }
    }
}

// ── Topology ────────────────────────────────────────────────────────

/// A single host in the datacenter topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub rack: String,
    pub hostname: String,
    pub ip: String,
}

/// A (source, target, fabric) tuple under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPair {
    pub source: Server,
    pub target: Server,
    pub fabric: FabricType,
}

// ── Thresholds ──────────────────────────────────────────────────────

/// Performance thresholds for one fabric, immutable for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub speed: f64,
    pub speed_units: String,
    pub latency: f64,
    pub latency_units: String,
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Result of a single pair-test invocation. Transient — consumed by the
/// orchestrator and ledger, never itself persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    /// Both measurements completed; `meets_thresholds` carries the verdict.
    Success {
        latency: f64,
        bandwidth: f64,
        meets_thresholds: bool,
    },
    /// The source IP was already running a test; no probe was invoked.
    Skipped { reason: String },
    /// A measurement exhausted its retry budget; carries the last error.
    Failed { error: String },
}

impl TestOutcome {
    /// True for a completed measurement that violated its thresholds —
    /// the only kind of outcome the ledger records.
    pub fn violates_thresholds(&self) -> bool {
        matches!(
            self,
            TestOutcome::Success {
                meets_thresholds: false,
                ..
            }
        )
    }
}

// ── Persisted ledger document ───────────────────────────────────────

/// Identity of one fabric in the datacenter metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricMetadata {
    #[serde(rename = "type")]
    pub fabric_type: String,
    pub version: String,
}

/// Fabric metadata recorded at the head of the ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterMetadata {
    pub ethernet: FabricMetadata,
    pub infiniband: FabricMetadata,
}

/// Measured-vs-expected bandwidth for a degraded connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthRecord {
    pub expected_speed: f64,
    pub actual_speed: f64,
    pub units: String,
    pub degradation_percentage: f64,
}

/// Measured latency for a degraded connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub lat: f64,
    pub units: String,
}

/// One threshold-violating connection, permanently appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(rename = "rack_1")]
    pub source_ip: String,
    #[serde(rename = "rack_2")]
    pub target_ip: String,
    #[serde(rename = "type")]
    pub fabric: FabricType,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub timestamp: String,
    #[serde(rename = "BW")]
    pub bandwidth: BandwidthRecord,
    pub latency: LatencyRecord,
}

/// The full persisted ledger: fabric metadata plus the ordered sequence of
/// degraded connections. Loaded, appended to, and rewritten as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub datacenter: DatacenterMetadata,
    pub connections: Vec<ConnectionRecord>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            datacenter: DatacenterMetadata {
                ethernet: FabricMetadata {
                    fabric_type: "Gigabit Ethernet".into(),
                    version: "v2.0".into(),
                },
                infiniband: FabricMetadata {
                    fabric_type: "InfiniBand".into(),
                    version: "v4.0".into(),
                },
            },
            connections: Vec::new(),
        }
    }
}
