//! Fabricheck — datacenter network-health verification.
//!
//! Loads the datacenter topology and thresholds, fans pair tests out across
//! a bounded worker pool per fabric, and appends threshold-violating
//! connections to the shared results ledger.
//!
//! Configuration problems abort the run before any test executes; per-pair
//! probe failures never do.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fabricheck_common::config::DatacenterConfig;
use fabricheck_common::models::{FabricType, Server, TestOutcome, TestPair};
use fabricheck_engine::ledger::ResultsLedger;
use fabricheck_engine::orchestrator::{BatchOrchestrator, DEFAULT_MAX_WORKERS};

/// Datacenter network-health verification.
#[derive(Parser, Debug)]
#[command(name = "fabricheck", about = "Datacenter network-health verification")]
struct Cli {
    /// Datacenter topology and thresholds (TOML).
    #[arg(long, default_value = "datacenter.toml")]
    config: PathBuf,

    /// Fabric to test (ethernet or infiniband). Defaults to every fabric
    /// declared in the configuration.
    #[arg(long)]
    fabric: Option<FabricType>,

    /// Degraded-connection ledger path.
    #[arg(long, default_value = "test_results.json")]
    output: PathBuf,

    /// Maximum concurrent pair tests.
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Fail-fast: a malformed configuration aborts before any pair test.
    let config = DatacenterConfig::load(&cli.config)?;
    let fabrics = match cli.fabric {
        Some(fabric) => vec![fabric],
        None => config.fabrics(),
    };

    let ledger = ResultsLedger::new(&cli.output);
    let orchestrator = BatchOrchestrator::new().with_max_workers(cli.max_workers);

    for fabric in fabrics {
        let thresholds = config.thresholds(fabric)?;
        let servers = config.servers(fabric)?;
        let pairs = all_pairs(&servers, fabric);
        let (fabric_type, version) = config.fabric_identity(fabric)?;

        tracing::info!(
            fabric = %fabric,
            fabric_type = %fabric_type,
            version = %version,
            servers = servers.len(),
            pairs = pairs.len(),
            "testing fabric"
        );

        let probe = fabricheck_probe::for_fabric(fabric);
        let outcomes = orchestrator.run_batch(pairs, &thresholds, probe, &ledger)?;

        let skipped = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TestOutcome::Skipped { .. }))
            .count();
        if skipped > 0 {
            tracing::warn!(
                fabric = %fabric,
                skipped,
                "pairs skipped on busy sources; re-run to cover them"
            );
        }
    }

    tracing::info!(ledger = %cli.output.display(), "verification complete");
    Ok(())
}

/// Every ordered (source, target) combination with distinct IPs — both
/// directions of every connection, within and across racks.
fn all_pairs(servers: &[Server], fabric: FabricType) -> Vec<TestPair> {
    let mut pairs = Vec::new();
    for source in servers {
        for target in servers {
            if source.ip != target.ip {
                pairs.push(TestPair {
                    source: source.clone(),
                    target: target.clone(),
                    fabric,
                });
            }
        }
    }
    pairs
}
