//! CLI configuration.
//!
//! Loaded from a YAML file given by `--config` or `QCAL_CONFIG`:
//!
//! ```yaml
//! store:
//!   path: qcal-store.json
//!   mirror: qcal-history.sqlite
//! execution:
//!   timeout_secs: 600
//!   progress: true
//! device:
//!   qubits: [q00, q01]
//!   device_fields: ["measure:pulse_amp"]
//!   initial:
//!     q00: { "clock_freqs:readout": 6.02e9, "measure:pulse_amp": 0.05 }
//! nodes:
//!   - name: resonator_spectroscopy
//!     owned_fields: ["clock_freqs:readout"]
//!     schedule:
//!       - name: readout_frequencies
//!         unit: Hz
//!         linspace: { start: 6.0e9, stop: 6.1e9, num: 101 }
//!     simulate: { model: lorentzian, center: 6.05e9, width: 2.0e6, depth: 0.8 }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use qcal_adapter_sim::SignalModel;
use qcal_core::{PhysicalElement, Samplespace, SettableQuantity, linspace};
use qcal_sweep::{ExecutionConfig, NodeDescriptor, NodeKind, ReshapeHints, SweepType};
use serde::{Deserialize, Serialize};

use crate::hooks::{AnalysisConfig, ConfigHooks};

/// Complete CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameter store location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Root of the run directories.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Hardware execution settings.
    #[serde(default)]
    pub execution: ExecutionSection,

    /// Simulated backend settings.
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Device layout and initial parameters.
    pub device: DeviceConfig,

    /// Calibration nodes, in run order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// Parameter store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding the parameter records.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Optional SQLite file receiving a copy of every write.
    #[serde(default)]
    pub mirror: Option<PathBuf>,
}

/// Hardware execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Upper bound on one hardware run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Draw a progress bar while the hardware runs.
    #[serde(default = "default_true")]
    pub progress: bool,
}

/// Simulated backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Amplitude of the uniform noise added to every point.
    #[serde(default = "default_noise")]
    pub noise: f64,

    /// Fixed noise seed.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Scale of the simulated run time (0 returns immediately).
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

/// Device layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Qubit ids.
    #[serde(default)]
    pub qubits: Vec<String>,

    /// Coupler ids (`q00_q01`).
    #[serde(default)]
    pub couplers: Vec<String>,

    /// Fields copied into every device snapshot.
    #[serde(default)]
    pub device_fields: Vec<String>,

    /// Parameter values written on first use, per element.
    #[serde(default)]
    pub initial: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Which elements a node calibrates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Qubits.
    #[default]
    Qubits,
    /// Couplers, measured through their qubits.
    Couplers,
}

/// One calibration node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, also the status field.
    pub name: String,

    /// Target element kind.
    #[serde(default)]
    pub kind: TargetKind,

    /// Target ids; all qubits or couplers of the device when omitted.
    #[serde(default)]
    pub targets: Option<Vec<String>>,

    /// Sweep type.
    #[serde(default)]
    pub sweep: SweepType,

    /// Fields this node recalibrates.
    #[serde(default)]
    pub owned_fields: Vec<String>,

    /// Fields that must be calibrated before this node runs.
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Back up owned fields before compiling.
    #[serde(default = "default_true")]
    pub backup: bool,

    /// Quantities swept inside one program.
    #[serde(default)]
    pub schedule: Vec<QuantityConfig>,

    /// Quantities stepped between programs.
    #[serde(default)]
    pub external: Vec<QuantityConfig>,

    /// Buffer layout hints.
    #[serde(default)]
    pub reshape: ReshapeHints,

    /// Response of the simulated hardware.
    #[serde(default)]
    pub simulate: SignalModel,

    /// Result extraction.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// A swept quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityConfig {
    /// Quantity name (device field name for external overrides).
    pub name: String,

    /// Unit of the values.
    #[serde(default)]
    pub unit: String,

    /// Evenly spaced values.
    #[serde(default)]
    pub linspace: Option<LinspaceConfig>,

    /// Explicit values.
    #[serde(default)]
    pub values: Option<Vec<f64>>,

    /// Elements sweeping these values; the node's targets when omitted.
    #[serde(default)]
    pub elements: Option<Vec<String>>,
}

/// `num` points over `[start, stop]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinspaceConfig {
    pub start: f64,
    pub stop: f64,
    pub num: usize,
}

fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qcal")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("qcal-store.json")
}

fn default_timeout_secs() -> f64 {
    600.0
}

fn default_true() -> bool {
    true
}

fn default_noise() -> f64 {
    0.02
}

fn default_time_scale() -> f64 {
    1.0
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            mirror: None,
        }
    }
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            progress: true,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            noise: default_noise(),
            seed: None,
            time_scale: default_time_scale(),
        }
    }
}

impl ExecutionSection {
    /// Settings for the execution stage.
    pub fn to_execution_config(&self) -> Result<ExecutionConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout_secs)
            .with_context(|| format!("Invalid execution timeout: {}", self.timeout_secs))?;
        Ok(ExecutionConfig {
            timeout,
            progress: self.progress,
        })
    }
}

impl QuantityConfig {
    /// The swept values.
    pub fn sweep_values(&self) -> Result<Vec<f64>> {
        match (&self.linspace, &self.values) {
            (Some(l), None) => Ok(linspace(l.start, l.stop, l.num)),
            (None, Some(values)) => Ok(values.clone()),
            (Some(_), Some(_)) => {
                anyhow::bail!("Quantity '{}' sets both linspace and values", self.name)
            }
            (None, None) => anyhow::bail!("Quantity '{}' sets neither linspace nor values", self.name),
        }
    }

    fn to_quantity(&self, default_elements: &[PhysicalElement]) -> Result<SettableQuantity> {
        let values = self.sweep_values()?;
        let elements = match &self.elements {
            Some(ids) => parse_elements(ids)?,
            None => default_elements.to_vec(),
        };
        Ok(elements
            .into_iter()
            .fold(SettableQuantity::new(&self.name, &self.unit), |q, e| {
                q.with_values(e, values.clone())
            }))
    }
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check element ids, node names and quantity values.
    pub fn validate(&self) -> Result<()> {
        parse_elements(&self.device.qubits)?;
        parse_elements(&self.device.couplers)?;
        for id in self.device.initial.keys() {
            PhysicalElement::parse(id).with_context(|| format!("Invalid element in initial values: {id}"))?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                anyhow::bail!("Duplicate node name: {}", node.name);
            }
            self.descriptor(node)
                .with_context(|| format!("Invalid node '{}'", node.name))?;
        }
        Ok(())
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Result<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name).ok_or_else(|| {
            let known: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
            anyhow::anyhow!("Unknown node '{name}'. Configured: {}", known.join(", "))
        })
    }

    /// Qubits and couplers of the device.
    pub fn elements(&self) -> Result<Vec<PhysicalElement>> {
        let mut elements = parse_elements(&self.device.qubits)?;
        elements.extend(parse_elements(&self.device.couplers)?);
        Ok(elements)
    }

    /// Target elements of a node.
    pub fn targets(&self, node: &NodeConfig) -> Result<NodeKind> {
        let default = match node.kind {
            TargetKind::Qubits => &self.device.qubits,
            TargetKind::Couplers => &self.device.couplers,
        };
        let ids = node.targets.as_ref().unwrap_or(default);
        if ids.is_empty() {
            anyhow::bail!("Node '{}' has no target elements", node.name);
        }
        let elements = parse_elements(ids)?;
        Ok(match node.kind {
            TargetKind::Qubits => NodeKind::qubits(elements),
            TargetKind::Couplers => NodeKind::couplers(elements),
        })
    }

    /// Build the runnable descriptor of a node.
    pub fn descriptor(&self, node: &NodeConfig) -> Result<NodeDescriptor> {
        let kind = self.targets(node)?;
        let keys: Vec<PhysicalElement> = match &kind {
            NodeKind::Qubits { qubits } => qubits.clone(),
            NodeKind::Couplers { couplers, .. } => couplers.clone(),
        };

        let mut schedule = Samplespace::new();
        for quantity in &node.schedule {
            schedule.push(quantity.to_quantity(&keys)?)?;
        }
        let mut external = Samplespace::new();
        for quantity in &node.external {
            external.push(quantity.to_quantity(&keys)?)?;
        }

        let hooks = ConfigHooks::new(node.simulate, node.analysis.clone(), node.reshape);
        Ok(NodeDescriptor::new(node.name.clone(), kind, Arc::new(hooks))
            .with_sweep_type(node.sweep)
            .with_schedule(schedule)
            .with_external(external)
            .with_owned_fields(node.owned_fields.iter().cloned())
            .with_prerequisites(node.prerequisites.iter().cloned())
            .with_backup(node.backup)
            .with_reshape(node.reshape))
    }
}

fn parse_elements(ids: &[String]) -> Result<Vec<PhysicalElement>> {
    ids.iter()
        .map(|id| PhysicalElement::parse(id).with_context(|| format!("Invalid element id: {id}")))
        .collect()
}
