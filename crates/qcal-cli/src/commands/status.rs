//! Status command implementation.
//!
//! Show node calibration flags, and optionally parameter values, of every
//! configured element.

use std::path::Path;

use anyhow::Result;
use console::style;
use qcal_store::NodeStatus;

use super::common::{load_config, open_store};

/// Execute the status command.
pub async fn execute(config_path: &Path, show_fields: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let elements = config.elements()?;

    if elements.is_empty() {
        println!("No elements configured.");
        return Ok(());
    }

    println!(
        "{} {} element(s), store {}\n",
        style("→").cyan().bold(),
        elements.len(),
        style(config.store.path.display()).dim()
    );

    println!(
        "  {:<10}  {:<32}  {}",
        style("ELEMENT").bold(),
        style("NODE").bold(),
        style("STATUS").bold()
    );
    println!("  {}", "-".repeat(60));

    for element in &elements {
        let statuses = store.statuses(element).await?;
        let mut first = true;
        for node in &config.nodes {
            let status = statuses
                .get(&node.name)
                .copied()
                .unwrap_or(NodeStatus::NotCalibrated);
            let styled = match status {
                NodeStatus::Calibrated => style(status.as_str()).green(),
                NodeStatus::NotCalibrated => style(status.as_str()).yellow(),
            };
            let label = if first { element.to_string() } else { String::new() };
            println!("  {:<10}  {:<32}  {}", label, node.name, styled);
            first = false;
        }

        if show_fields {
            for (field, value) in store.fields(element).await? {
                println!("  {:<10}    {:<30}  {}", "", style(field).dim(), value);
            }
        }
    }

    Ok(())
}
