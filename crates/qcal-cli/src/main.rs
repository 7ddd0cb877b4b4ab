//! qcal Command-Line Interface
//!
//! Runs calibration nodes from a YAML configuration against the simulated
//! backend and manages the parameter store they write to.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod hooks;

use commands::rollback::RollbackTarget;
use commands::{inspect, reset, rollback, run, status};

/// qcal - sweep orchestration for superconducting-qubit calibration
#[derive(Parser)]
#[command(name = "qcal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Configuration file
    #[arg(short, long, env = "QCAL_CONFIG", default_value = "qcal.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run calibration nodes in configuration order
    Run {
        /// Node to run (repeatable)
        #[arg(short, long = "node")]
        nodes: Vec<String>,

        /// Run every configured node
        #[arg(short, long, conflicts_with = "nodes")]
        all: bool,
    },

    /// Show calibration status of every element
    Status {
        /// Also print stored parameter values
        #[arg(short, long)]
        fields: bool,
    },

    /// Restore parameters from their backups
    Rollback {
        /// Element id (q00, q00_q01)
        #[arg(short, long, requires = "field", conflicts_with = "node")]
        element: Option<String>,

        /// Field name (clock_freqs:f01)
        #[arg(short, long, requires = "element")]
        field: Option<String>,

        /// Restore every owned field of a node instead
        #[arg(short, long)]
        node: Option<String>,
    },

    /// Mark a node as not calibrated
    Reset {
        /// Node name
        #[arg(short, long)]
        node: String,
    },

    /// Summarize a dataset file
    Inspect {
        /// Dataset file (.json or .hdf5)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let result = match cli.command {
        Commands::Run { nodes, all } => run::execute(&cli.config, &nodes, all).await,

        Commands::Status { fields } => status::execute(&cli.config, fields).await,

        Commands::Rollback {
            element,
            field,
            node,
        } => {
            let target = match (&element, &field, &node) {
                (Some(element), Some(field), None) => RollbackTarget::Field { element, field },
                (None, None, Some(node)) => RollbackTarget::Node(node),
                _ => {
                    eprintln!(
                        "{} Use --element with --field, or --node",
                        style("Error:").red().bold()
                    );
                    std::process::exit(2);
                }
            };
            rollback::execute(&cli.config, target).await
        }

        Commands::Reset { node } => reset::execute(&cli.config, &node).await,

        Commands::Inspect { path } => inspect::execute(&path),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
