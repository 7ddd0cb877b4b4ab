//! Inspect command implementation.
//!
//! Load a dataset file and print its layout.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use qcal_sweep::{Axis, LabeledArray, load_dataset};

/// Execute the inspect command.
pub fn execute(path: &Path) -> Result<()> {
    let dataset = load_dataset(path)
        .with_context(|| format!("Failed to load dataset: {}", path.display()))?;

    println!(
        "{} {} ({} element(s))",
        style("→").cyan().bold(),
        style(&dataset.node).green(),
        dataset.len()
    );

    for (element, data) in &dataset.elements {
        println!(
            "\n  {} (acquisition {})",
            style(element).bold(),
            data.acquisition
        );
        print_array("values", &data.values);
        if let Some(calibration) = &data.calibration {
            print_array("calibration", calibration);
        }
    }
    Ok(())
}

fn print_array(label: &str, array: &LabeledArray) {
    let missing = array
        .data
        .iter()
        .filter(|v| v.re.is_nan() || v.im.is_nan())
        .count();
    println!(
        "    {} {:?}{}",
        label,
        array.shape(),
        if missing > 0 {
            format!(", {missing} missing")
        } else {
            String::new()
        }
    );
    for axis in &array.axes {
        println!("      {}", describe_axis(axis));
    }
}

fn describe_axis(axis: &Axis) -> String {
    let range = match (axis.coords.first(), axis.coords.last()) {
        (Some(first), Some(last)) if axis.len() > 1 => format!("{first} .. {last}"),
        (Some(only), _) => format!("{only}"),
        _ => "empty".to_string(),
    };
    let unit = if axis.unit.is_empty() {
        String::new()
    } else {
        format!(" [{}]", axis.unit)
    };
    format!(
        "{:<24} {:<12} {:>5} pts  {}{}",
        axis.name,
        format!("{:?}", axis.role).to_lowercase(),
        axis.len(),
        range,
        unit
    )
}
