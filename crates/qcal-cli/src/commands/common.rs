//! Shared helpers for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use qcal_adapter_sim::{SimulatedCompiler, SimulatedDriver};
use qcal_core::PhysicalElement;
use qcal_store::{JsonStore, ParameterStore, SqliteMirror};
use qcal_sweep::SweepOrchestrator;
use tracing::debug;

use crate::config::Config;

/// Load the configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!(
            "Config file not found: {} (set --config or QCAL_CONFIG)",
            path.display()
        );
    }
    Config::from_file(path)
}

/// Open the parameter store, with its mirror if one is configured.
pub async fn open_store(config: &Config) -> Result<ParameterStore> {
    let backend = JsonStore::open(&config.store.path)
        .await
        .with_context(|| format!("Failed to open store: {}", config.store.path.display()))?;
    let mut store = ParameterStore::new(Arc::new(backend));

    if let Some(mirror) = &config.store.mirror {
        let sink = SqliteMirror::new(mirror)
            .with_context(|| format!("Failed to open mirror: {}", mirror.display()))?;
        store = store.with_mirror(Arc::new(sink));
    }
    Ok(store)
}

/// Write the configured initial values that are not in the store yet.
pub async fn seed_initial_values(store: &ParameterStore, config: &Config) -> Result<usize> {
    let mut written = 0;
    for (id, fields) in &config.device.initial {
        let element = PhysicalElement::parse(id)?;
        for (field, value) in fields {
            if !store.exists(&element, field).await? {
                store.set_value(&element, field, *value).await?;
                written += 1;
            }
        }
    }
    if written > 0 {
        debug!("Seeded {} initial values", written);
    }
    Ok(written)
}

/// Orchestrator running against the simulated backend.
pub fn simulated_orchestrator(config: &Config, store: ParameterStore) -> Result<SweepOrchestrator> {
    let sim = &config.simulator;
    let mut driver = SimulatedDriver::new()
        .with_noise(sim.noise)
        .with_time_scale(sim.time_scale);
    if let Some(seed) = sim.seed {
        driver = driver.with_seed(seed);
    }

    Ok(SweepOrchestrator::new(
        store,
        Arc::new(SimulatedCompiler::new()),
        Box::new(driver),
        config.output_dir.clone(),
    )
    .with_device_fields(config.device.device_fields.clone())
    .with_execution(config.execution.to_execution_config()?))
}
