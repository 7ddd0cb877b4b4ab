//! Reset command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use super::common::{load_config, open_store};

/// Mark a node as not calibrated on all of its targets.
pub async fn execute(config_path: &Path, node: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    let elements = config.targets(config.node(node)?)?.elements();
    store.reset_node(&elements, node).await?;

    println!(
        "{} Reset {} on {} element(s)",
        style("→").cyan().bold(),
        style(node).green(),
        elements.len()
    );
    Ok(())
}
