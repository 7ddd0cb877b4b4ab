//! Rollback command implementation.
//!
//! Restore parameters from the backups taken before recalibration.

use std::path::Path;

use anyhow::Result;
use console::style;
use qcal_core::PhysicalElement;

use super::common::{load_config, open_store};

/// What to restore.
pub enum RollbackTarget<'a> {
    /// One field of one element.
    Field { element: &'a str, field: &'a str },
    /// Every owned field of a node on its targets.
    Node(&'a str),
}

/// Execute the rollback command.
pub async fn execute(config_path: &Path, target: RollbackTarget<'_>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    let pairs: Vec<(PhysicalElement, String)> = match target {
        RollbackTarget::Field { element, field } => {
            vec![(PhysicalElement::parse(element)?, field.to_string())]
        }
        RollbackTarget::Node(name) => {
            let node = config.node(name)?;
            let kind = config.targets(node)?;
            kind.elements()
                .into_iter()
                .flat_map(|e| node.owned_fields.iter().map(move |f| (e.clone(), f.clone())))
                .collect()
        }
    };

    let mut restored = 0;
    for (element, field) in &pairs {
        if store.restore_backup(element, field).await? {
            let value = store.parameter(element, field).await?;
            println!(
                "  {} {} {} = {}",
                style("✓").green().bold(),
                element,
                field,
                style(value).yellow()
            );
            restored += 1;
        } else {
            println!("  {} {} {}: no backup", style("-").dim(), element, field);
        }
    }

    if restored == 0 && !pairs.is_empty() {
        anyhow::bail!("Nothing to restore");
    }
    println!("{} Restored {} field(s)", style("→").cyan().bold(), restored);
    Ok(())
}
