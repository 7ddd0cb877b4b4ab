//! Sweep orchestrator: runs one calibration node end to end.
//!
//! ```text
//!   Idle ──→ Compiled ──→ Measured ──→ Merged ──→ Analyzed ──→ Idle
//!               ↑            ↑            │
//!               │            └────────────┤  simple sweep: next external value
//!               └─────────────────────────┘  parameterized sweep: recompile
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qcal_core::Samplespace;
use qcal_hal::{CompiledProgram, ExperimentCompiler, HardwareDriver};
use qcal_store::{NodeStatus, ParameterStore};
use tracing::{debug, info, instrument};

use crate::assemble::assemble;
use crate::compile::CompilationStage;
use crate::dataset::AssembledDataset;
use crate::error::{NodeFailed, SweepError, SweepResult};
use crate::execute::{ExecutionConfig, execute};
use crate::node::{NodeDescriptor, SweepType};
use crate::persist::RunDirectory;

/// Orchestrator state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No node running.
    Idle,
    /// A program is ready to run.
    Compiled,
    /// Raw data has been assembled.
    Measured,
    /// The iteration's data has been merged.
    Merged,
    /// Analysis has finished.
    Analyzed,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Compiled => "compiled",
            OrchestratorState::Measured => "measured",
            OrchestratorState::Merged => "merged",
            OrchestratorState::Analyzed => "analyzed",
        };
        f.write_str(name)
    }
}

/// Result of a successful node run.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// Node name.
    pub node: String,
    /// Number of measurements taken.
    pub iterations: usize,
    /// Merged data of every iteration.
    pub dataset: AssembledDataset,
    /// Run directory.
    pub run_dir: PathBuf,
    /// Dataset files written, in order.
    pub datasets: Vec<PathBuf>,
}

/// What has been produced so far in a run.
#[derive(Default)]
struct RunProgress {
    iteration: usize,
    measurements: usize,
    merged: Option<AssembledDataset>,
    datasets: Vec<PathBuf>,
}

impl RunProgress {
    fn last_dataset(&self) -> Option<PathBuf> {
        self.datasets.last().cloned()
    }
}

/// Drives compilation, execution, assembly and analysis of calibration
/// nodes against one hardware driver.
pub struct SweepOrchestrator {
    store: ParameterStore,
    compiler: Arc<dyn ExperimentCompiler>,
    driver: Box<dyn HardwareDriver>,
    device_fields: Vec<String>,
    execution: ExecutionConfig,
    output_root: PathBuf,
    state: OrchestratorState,
}

impl SweepOrchestrator {
    /// Create an orchestrator writing run directories under `output_root`.
    pub fn new(
        store: ParameterStore,
        compiler: Arc<dyn ExperimentCompiler>,
        driver: Box<dyn HardwareDriver>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            compiler,
            driver,
            device_fields: Vec::new(),
            execution: ExecutionConfig::default(),
            output_root: output_root.into(),
            state: OrchestratorState::Idle,
        }
    }

    /// Fields copied into every device snapshot.
    #[must_use]
    pub fn with_device_fields(mut self, fields: Vec<String>) -> Self {
        self.device_fields = fields;
        self
    }

    /// Execution settings.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The parameter store.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Root of the run directories.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run one node.
    ///
    /// On failure the remaining iterations are skipped and the data merged
    /// so far is returned inside [`NodeFailed`].
    #[instrument(skip_all, fields(node = %node.name))]
    pub async fn run(&mut self, node: &mut NodeDescriptor) -> Result<NodeOutcome, NodeFailed> {
        let mut progress = RunProgress::default();
        let result = self.run_stages(node, &mut progress).await;
        self.transition(&node.name, OrchestratorState::Idle);

        match result {
            Ok(run_dir) => Ok(NodeOutcome {
                node: node.name.clone(),
                iterations: progress.measurements,
                dataset: progress
                    .merged
                    .unwrap_or_else(|| AssembledDataset::new(node.name.clone())),
                run_dir,
                datasets: progress.datasets,
            }),
            Err(source) => Err(NodeFailed {
                node: node.name.clone(),
                iteration: progress.iteration,
                last_dataset: progress.last_dataset(),
                source,
                partial: progress.merged,
            }),
        }
    }

    async fn run_stages(
        &mut self,
        node: &mut NodeDescriptor,
        progress: &mut RunProgress,
    ) -> SweepResult<PathBuf> {
        node.schedule.validate()?;
        let iterations = node.external_iterations()?;
        if iterations > 1 {
            node.external.check_coverage(node.kind.target_qubits())?;
        }
        let run_dir = RunDirectory::create(&self.output_root, &node.name)?;
        info!(
            "Running {} ({} sweep, {} external iterations) in {}",
            node.name,
            node.sweep_type,
            iterations,
            run_dir.path().display()
        );

        for element in node.kind.elements() {
            self.store
                .set_status(&element, &node.name, NodeStatus::NotCalibrated)
                .await?;
        }

        match (node.sweep_type, iterations) {
            (_, 0) => {
                node.reduced_external = Samplespace::new();
                let program = self.compile(node, &run_dir).await?;
                self.measure(node, &program, &run_dir, progress).await?;
            }
            (SweepType::Simple, _) => {
                node.reduced_external = Samplespace::new();
                let program = self.compile(node, &run_dir).await?;
                for i in 0..iterations {
                    progress.iteration = i;
                    node.reduced_external = node.external.slice(i)?;
                    self.pre_measurement(node).await?;
                    self.measure(node, &program, &run_dir, progress).await?;
                }
            }
            (SweepType::Parameterized, _) => {
                for i in 0..iterations {
                    progress.iteration = i;
                    node.reduced_external = node.external.slice(i)?;
                    self.pre_measurement(node).await?;
                    let program = self.compile(node, &run_dir).await?;
                    self.measure(node, &program, &run_dir, progress).await?;
                }
            }
        }

        if iterations > 1 {
            if let Some(merged) = &progress.merged {
                let path = run_dir.write_dataset(merged)?;
                debug!("Saved merged dataset to {}", path.display());
                progress.datasets.push(path);
            }
        }

        let dataset = progress
            .merged
            .get_or_insert_with(|| AssembledDataset::new(node.name.clone()));
        node.hooks
            .analyze(node, dataset, &self.store)
            .await
            .map_err(|e| SweepError::hook("analysis", e))?;
        self.transition(&node.name, OrchestratorState::Analyzed);

        for element in node.kind.elements() {
            self.store
                .set_status(&element, &node.name, NodeStatus::Calibrated)
                .await?;
        }
        info!("Node {} calibrated", node.name);
        Ok(run_dir.path().to_path_buf())
    }

    async fn compile(
        &mut self,
        node: &NodeDescriptor,
        run_dir: &RunDirectory,
    ) -> SweepResult<CompiledProgram> {
        let stage = CompilationStage::new(&self.store, self.compiler.as_ref(), &self.device_fields);
        let program = stage.compile(node, run_dir).await?;
        self.transition(&node.name, OrchestratorState::Compiled);
        Ok(program)
    }

    async fn pre_measurement(&self, node: &NodeDescriptor) -> SweepResult<()> {
        node.hooks
            .pre_measurement(&self.store, &node.reduced_external)
            .await
            .map_err(|e| SweepError::hook("pre_measurement", e))
    }

    async fn measure(
        &mut self,
        node: &NodeDescriptor,
        program: &CompiledProgram,
        run_dir: &RunDirectory,
        progress: &mut RunProgress,
    ) -> SweepResult<()> {
        let raw = execute(program, self.driver.as_mut(), &self.execution).await?;
        let dataset = assemble(raw, program, node)?;
        self.transition(&node.name, OrchestratorState::Measured);

        progress.measurements += 1;
        match progress.merged.as_mut() {
            Some(merged) => merged.merge(dataset.clone())?,
            None => progress.merged = Some(dataset.clone()),
        }
        let path = run_dir.write_dataset(&dataset)?;
        progress.datasets.push(path);
        self.transition(&node.name, OrchestratorState::Merged);
        Ok(())
    }

    fn transition(&mut self, node: &str, to: OrchestratorState) {
        if self.state != to {
            info!("{}: {} -> {}", node, self.state, to);
        }
        self.state = to;
    }
}
