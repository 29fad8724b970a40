#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Stress driver: runs a seeded simulation against the tree and fails on any
// invariant violation.
//
//   BPS_STRESS_SEED, BPS_STRESS_OPERATIONS   workload
//   BPS_TREE_BLOCK_SIZE, BPS_TREE_EXTENT_SIZE,
//   BPS_TREE_LINEAR_SEARCH                   tree layout
//   RUST_LOG                                 log filter

use bps_tree::config::StressConfig;
use bps_tree::simulation::{Simulator, SimulatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Full content checks are linear in the tree size; run them periodically.
const CHECK_INTERVAL: usize = 100;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bps_tree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match StressConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: seed={}, operations={}, block_size={}, extent_size={}, search={:?}",
        config.seed,
        config.operations,
        config.tree.block_size,
        config.tree.extent_size,
        config.tree.search
    );

    let simulator_config = SimulatorConfig::new(config.seed)
        .with_tree_config(config.tree)
        .with_check_interval(CHECK_INTERVAL);
    let result = Simulator::new(simulator_config).run(config.operations);

    if let Some(error) = &result.error {
        tracing::error!("Simulation could not start: {error}");
        std::process::exit(1);
    }

    tracing::info!(
        inserts = result.inserts,
        replacements = result.replacements,
        deletes = result.deletes,
        lookups = result.lookups,
        rebuilds = result.rebuilds,
        final_size = result.final_size,
        "simulation finished"
    );

    if !result.passed() {
        for violation in &result.invariant_violations {
            tracing::error!(
                operation = violation.operation_index,
                "{}: {}",
                violation.description,
                violation.context
            );
        }
        tracing::error!(
            "{} invariant violations with seed {}",
            result.invariant_violations.len(),
            result.seed
        );
        std::process::exit(1);
    }
}
