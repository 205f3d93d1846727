//! Datacenter topology configuration.
//!
//! The `datacenter_map` TOML document declares, per fabric, the performance
//! thresholds and the rack → hostname → IP topology to test:
//!
//! ```toml
//! [datacenter_map.ethernet]
//! type = "Gigabit Ethernet"
//! version = "v2.0"
//!
//! [datacenter_map.ethernet.thresholds]
//! speed = 10.0
//! speed_units = "Gbits/sec"
//! latency = 0.5
//! latency_units = "ms"
//!
//! [datacenter_map.ethernet.racks.rack-a]
//! node01 = "10.0.1.1"
//! node02 = "10.0.1.2"
//! ```
//!
//! Loading is fail-fast: a malformed document aborts the whole run before
//! any pair test executes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{FabricType, Server, ThresholdConfig};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration TOML: {0}")]
    Parse(#[from] Box<toml::de::Error>),
    #[error("no `{0}` fabric in datacenter_map")]
    UnknownFabric(FabricType),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Document shape ──────────────────────────────────────────────────

/// Raw document as deserialized from TOML. Fabric names are free-form
/// strings until `resolve` maps them onto [`FabricType`].
#[derive(Debug, Clone, Deserialize)]
struct DatacenterConfigInput {
    datacenter_map: BTreeMap<String, FabricConfig>,
}

/// Validated configuration document.
#[derive(Debug, Clone)]
pub struct DatacenterConfig {
    datacenter_map: BTreeMap<FabricType, FabricConfig>,
}

/// Per-fabric configuration: identity, thresholds, and rack topology.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricConfig {
    /// Human-readable fabric description, e.g. "Gigabit Ethernet".
    #[serde(rename = "type")]
    pub fabric_type: String,
    pub version: String,
    pub thresholds: ThresholdConfig,
    /// rack name → hostname → IP. BTreeMaps keep server enumeration
    /// deterministic across runs.
    #[serde(default)]
    pub racks: BTreeMap<String, BTreeMap<String, String>>,
}

impl DatacenterConfigInput {
    fn resolve(self) -> Result<DatacenterConfig, ConfigError> {
        if self.datacenter_map.is_empty() {
            return Err(ConfigError::Invalid(
                "datacenter_map declares no fabrics".into(),
            ));
        }
        let mut datacenter_map = BTreeMap::new();
        for (name, cfg) in self.datacenter_map {
            let fabric: FabricType = name.parse().map_err(ConfigError::Invalid)?;
            // The degradation formula divides by the expected speed.
            if cfg.thresholds.speed <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{fabric}: threshold speed must be positive, got {}",
                    cfg.thresholds.speed
                )));
            }
            if cfg.thresholds.latency < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{fabric}: threshold latency must not be negative, got {}",
                    cfg.thresholds.latency
                )));
            }
            datacenter_map.insert(fabric, cfg);
        }
        Ok(DatacenterConfig { datacenter_map })
    }
}

impl DatacenterConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: DatacenterConfigInput = toml::from_str(input).map_err(Box::new)?;
        parsed.resolve()
    }

    /// Fabrics declared in the configuration, in stable order.
    pub fn fabrics(&self) -> Vec<FabricType> {
        self.datacenter_map.keys().copied().collect()
    }

    fn fabric(&self, fabric: FabricType) -> Result<&FabricConfig, ConfigError> {
        self.datacenter_map
            .get(&fabric)
            .ok_or(ConfigError::UnknownFabric(fabric))
    }

    /// Performance thresholds for one fabric.
    pub fn thresholds(&self, fabric: FabricType) -> Result<ThresholdConfig, ConfigError> {
        Ok(self.fabric(fabric)?.thresholds.clone())
    }

    /// Human-readable identity of one fabric (type + version).
    pub fn fabric_identity(&self, fabric: FabricType) -> Result<(String, String), ConfigError> {
        let cfg = self.fabric(fabric)?;
        Ok((cfg.fabric_type.clone(), cfg.version.clone()))
    }

    /// Flatten the rack topology of one fabric into a server list,
    /// ordered by rack then hostname.
    pub fn servers(&self, fabric: FabricType) -> Result<Vec<Server>, ConfigError> {
        let cfg = self.fabric(fabric)?;
        let mut servers = Vec::new();
        for (rack, hosts) in &cfg.racks {
            for (hostname, ip) in hosts {
                servers.push(Server {
                    rack: rack.clone(),
                    hostname: hostname.clone(),
                    ip: ip.clone(),
                });
            }
        }
        Ok(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [datacenter_map.ethernet]
        type = "Gigabit Ethernet"
        version = "v2.0"

        [datacenter_map.ethernet.thresholds]
        speed = 100.0
        speed_units = "Gbits/sec"
        latency = 0.1
        latency_units = "ms"

        [datacenter_map.ethernet.racks.rack-a]
        node01 = "192.168.1.1"
        node02 = "192.168.1.2"

        [datacenter_map.ethernet.racks.rack-b]
        node03 = "192.168.2.1"

        [datacenter_map.infiniband]
        type = "InfiniBand"
        version = "v4.0"

        [datacenter_map.infiniband.thresholds]
        speed = 200.0
        speed_units = "Gbits/sec"
        latency = 2.0
        latency_units = "usec"
    "#;

    #[test]
    fn parses_thresholds_and_identity() {
        let config = DatacenterConfig::from_toml_str(SAMPLE).unwrap();
        let thresholds = config.thresholds(FabricType::Ethernet).unwrap();
        assert_eq!(thresholds.speed, 100.0);
        assert_eq!(thresholds.speed_units, "Gbits/sec");
        assert_eq!(thresholds.latency, 0.1);
        assert_eq!(thresholds.latency_units, "ms");

        let (fabric_type, version) = config.fabric_identity(FabricType::Infiniband).unwrap();
        assert_eq!(fabric_type, "InfiniBand");
        assert_eq!(version, "v4.0");
    }

    #[test]
    fn flattens_racks_into_ordered_servers() {
        let config = DatacenterConfig::from_toml_str(SAMPLE).unwrap();
        let servers = config.servers(FabricType::Ethernet).unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].rack, "rack-a");
        assert_eq!(servers[0].hostname, "node01");
        assert_eq!(servers[0].ip, "192.168.1.1");
        assert_eq!(servers[2].rack, "rack-b");
        assert_eq!(servers[2].ip, "192.168.2.1");

        // Infiniband has no racks declared — empty list, not an error.
        let servers = config.servers(FabricType::Infiniband).unwrap();
        assert!(servers.is_empty());

        assert_eq!(
            config.fabrics(),
            vec![FabricType::Ethernet, FabricType::Infiniband]
        );
    }

    #[test]
    fn unknown_fabric_is_an_error() {
        let toml = r#"
            [datacenter_map.ethernet]
            type = "Test Ethernet"
            version = "v1.0"
            [datacenter_map.ethernet.thresholds]
            speed = 100.0
            speed_units = "Gbits/sec"
            latency = 0.1
            latency_units = "ms"
        "#;
        let config = DatacenterConfig::from_toml_str(toml).unwrap();
        assert!(matches!(
            config.thresholds(FabricType::Infiniband),
            Err(ConfigError::UnknownFabric(FabricType::Infiniband))
        ));
    }

    #[test]
    fn rejects_empty_and_malformed_documents() {
        assert!(matches!(
            DatacenterConfig::from_toml_str("datacenter_map = {}"),
            Err(ConfigError::Invalid(_))
        ));
        // Missing datacenter_map entirely.
        assert!(matches!(
            DatacenterConfig::from_toml_str("[other]\nx = 1"),
            Err(ConfigError::Parse(_))
        ));
        // Missing threshold fields.
        let toml = r#"
            [datacenter_map.ethernet]
            type = "Test Ethernet"
            version = "v1.0"
            [datacenter_map.ethernet.thresholds]
            speed = 100.0
        "#;
        assert!(matches!(
            DatacenterConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unknown_fabric_names() {
        let toml = r#"
            [datacenter_map.token-ring]
            type = "Token Ring"
            version = "v1.0"
            [datacenter_map.token-ring.thresholds]
            speed = 16.0
            speed_units = "Mbits/sec"
            latency = 1.0
            latency_units = "ms"
        "#;
        assert!(matches!(
            DatacenterConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_non_positive_speed() {
        let toml = r#"
            [datacenter_map.ethernet]
            type = "Test Ethernet"
            version = "v1.0"
            [datacenter_map.ethernet.thresholds]
            speed = 0.0
            speed_units = "Gbits/sec"
            latency = 0.1
            latency_units = "ms"
        "#;
        assert!(matches!(
            DatacenterConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datacenter.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = DatacenterConfig::load(&path).unwrap();
        assert_eq!(config.fabrics().len(), 2);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            DatacenterConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
