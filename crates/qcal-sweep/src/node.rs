//! Calibration node description.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use qcal_core::{PhysicalElement, Samplespace};
use qcal_hal::{DeviceSnapshot, Experiment};
use qcal_store::ParameterStore;
use serde::{Deserialize, Serialize};

use crate::dataset::AssembledDataset;

/// What a node calibrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Single-qubit node.
    Qubits { qubits: Vec<PhysicalElement> },
    /// Two-qubit node. `qubits` are the constituents of `couplers`.
    Couplers {
        couplers: Vec<PhysicalElement>,
        qubits: Vec<PhysicalElement>,
    },
}

impl NodeKind {
    /// A single-qubit node.
    pub fn qubits(qubits: Vec<PhysicalElement>) -> Self {
        NodeKind::Qubits { qubits }
    }

    /// A coupler node; the target qubits are derived from the couplers.
    pub fn couplers(couplers: Vec<PhysicalElement>) -> Self {
        let mut qubits: Vec<PhysicalElement> =
            couplers.iter().flat_map(PhysicalElement::qubits).collect();
        qubits.sort();
        qubits.dedup();
        NodeKind::Couplers { couplers, qubits }
    }

    /// Target qubits.
    pub fn target_qubits(&self) -> &[PhysicalElement] {
        match self {
            NodeKind::Qubits { qubits } | NodeKind::Couplers { qubits, .. } => qubits,
        }
    }

    /// Target couplers; empty for qubit nodes.
    pub fn target_couplers(&self) -> &[PhysicalElement] {
        match self {
            NodeKind::Qubits { .. } => &[],
            NodeKind::Couplers { couplers, .. } => couplers,
        }
    }

    /// Every element whose parameters or status the node touches.
    pub fn elements(&self) -> Vec<PhysicalElement> {
        self.target_qubits()
            .iter()
            .chain(self.target_couplers())
            .cloned()
            .collect()
    }
}

/// How often a node compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepType {
    /// Compile once; external values are applied between measurements.
    #[default]
    Simple,
    /// Recompile for every external value.
    Parameterized,
}

impl fmt::Display for SweepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepType::Simple => write!(f, "simple"),
            SweepType::Parameterized => write!(f, "parameterized"),
        }
    }
}

/// How the hardware lays out an acquisition buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReshapeHints {
    /// Reference slots appended after the sweep data.
    pub calibration_points: usize,
    /// Repeated shots, outermost in the buffer.
    pub shots: Option<usize>,
    /// Repetitions interleaved right after the first swept axis.
    pub loop_repetitions: Option<usize>,
}

/// Node-specific behaviour plugged into the orchestrator.
///
/// `build_experiment` and `analyze` are required; the pre-measurement hook
/// defaults to doing nothing.
#[async_trait]
pub trait NodeHooks: Send + Sync {
    /// Called before every measurement with the active external slice.
    async fn pre_measurement(
        &self,
        _store: &ParameterStore,
        _external: &Samplespace,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Describe the experiment for the compiler.
    fn build_experiment(
        &self,
        node: &NodeDescriptor,
        device: &DeviceSnapshot,
    ) -> anyhow::Result<Experiment>;

    /// Fit the merged data and write results to the store.
    async fn analyze(
        &self,
        node: &NodeDescriptor,
        dataset: &AssembledDataset,
        store: &ParameterStore,
    ) -> anyhow::Result<()>;
}

/// Everything the orchestrator needs to run one calibration node.
#[derive(Clone)]
pub struct NodeDescriptor {
    /// Node name, e.g. `resonator_spectroscopy`.
    pub name: String,
    /// Targets.
    pub kind: NodeKind,
    /// Simple or parameterized.
    pub sweep_type: SweepType,
    /// Values swept inside the compiled program.
    pub schedule: Samplespace,
    /// Values swept between executions.
    pub external: Samplespace,
    /// Single-value slice of `external` currently active.
    pub reduced_external: Samplespace,
    /// Fields this node writes.
    pub owned_fields: Vec<String>,
    /// Back up owned fields before compiling.
    pub backup: bool,
    /// Fields that must be calibrated before this node can run.
    pub prerequisites: Vec<String>,
    /// Buffer layout.
    pub reshape: ReshapeHints,
    /// Node-specific hooks.
    pub hooks: Arc<dyn NodeHooks>,
}

impl NodeDescriptor {
    /// Create a node with empty samplespaces.
    pub fn new(name: impl Into<String>, kind: NodeKind, hooks: Arc<dyn NodeHooks>) -> Self {
        Self {
            name: name.into(),
            kind,
            sweep_type: SweepType::Simple,
            schedule: Samplespace::new(),
            external: Samplespace::new(),
            reduced_external: Samplespace::new(),
            owned_fields: Vec::new(),
            backup: true,
            prerequisites: Vec::new(),
            reshape: ReshapeHints::default(),
            hooks,
        }
    }

    /// Set the sweep type.
    #[must_use]
    pub fn with_sweep_type(mut self, sweep_type: SweepType) -> Self {
        self.sweep_type = sweep_type;
        self
    }

    /// Set the schedule samplespace.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Samplespace) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the external samplespace.
    #[must_use]
    pub fn with_external(mut self, external: Samplespace) -> Self {
        self.external = external;
        self
    }

    /// Set the owned fields.
    #[must_use]
    pub fn with_owned_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owned_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the prerequisite fields.
    #[must_use]
    pub fn with_prerequisites<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable backups.
    #[must_use]
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Set the reshape hints.
    #[must_use]
    pub fn with_reshape(mut self, reshape: ReshapeHints) -> Self {
        self.reshape = reshape;
        self
    }

    /// Number of external iterations; 0 when nothing is swept externally.
    pub fn external_iterations(&self) -> qcal_core::SamplespaceResult<usize> {
        self.external.sweep_dimension()
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("sweep_type", &self.sweep_type)
            .field("schedule", &self.schedule)
            .field("external", &self.external)
            .field("reduced_external", &self.reduced_external)
            .field("owned_fields", &self.owned_fields)
            .field("backup", &self.backup)
            .field("prerequisites", &self.prerequisites)
            .field("reshape", &self.reshape)
            .finish_non_exhaustive()
    }
}
