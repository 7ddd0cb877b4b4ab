//! Run command implementation.
//!
//! Runs calibration nodes in configuration order against the simulated
//! backend and stops the chain at the first failing node.

use std::path::Path;

use anyhow::Result;
use console::style;

use super::common::{load_config, open_store, seed_initial_values, simulated_orchestrator};

/// Execute the run command.
pub async fn execute(config_path: &Path, nodes: &[String], all: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let selected: Vec<_> = if all {
        config.nodes.iter().collect()
    } else if nodes.is_empty() {
        anyhow::bail!("Please name a node with --node or use --all");
    } else {
        nodes
            .iter()
            .map(|name| config.node(name))
            .collect::<Result<_>>()?
    };

    let store = open_store(&config).await?;
    let seeded = seed_initial_values(&store, &config).await?;
    if seeded > 0 {
        println!("  Seeded {} initial parameter values", seeded);
    }

    let mut orchestrator = simulated_orchestrator(&config, store)?;
    println!(
        "{} Running {} node(s), output in {}",
        style("→").cyan().bold(),
        selected.len(),
        style(config.output_dir.display()).dim()
    );

    for node_config in selected {
        let mut node = config.descriptor(node_config)?;
        println!(
            "\n{} {} ({} sweep, {} target(s))",
            style("→").cyan().bold(),
            style(&node.name).green(),
            node.sweep_type,
            node.kind.elements().len()
        );

        match orchestrator.run(&mut node).await {
            Ok(outcome) => {
                println!(
                    "  {} {} measurement(s), {} dataset file(s)",
                    style("✓").green().bold(),
                    outcome.iterations,
                    outcome.datasets.len()
                );
                println!("  Run directory: {}", style(outcome.run_dir.display()).dim());
                for field in &node.owned_fields {
                    for element in node.kind.target_qubits() {
                        let value = orchestrator.store().parameter(element, field).await?;
                        println!("    {:<8} {:<28} {}", element, field, style(value).yellow());
                    }
                }
            }
            Err(failed) => {
                println!(
                    "  {} {} failed at iteration {}",
                    style("✗").red().bold(),
                    style(&failed.node).red(),
                    failed.iteration
                );
                match &failed.last_dataset {
                    Some(path) => println!("  Last dataset: {}", path.display()),
                    None => println!("  No dataset was written"),
                }
                return Err(failed.into());
            }
        }
    }

    Ok(())
}
