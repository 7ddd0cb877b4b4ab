//! Compilation stage: store state to executable program.

use qcal_core::PhysicalElement;
use qcal_hal::{CompileRequest, CompiledProgram, DeviceSnapshot, ExperimentCompiler};
use qcal_store::{BackupOutcome, ParameterStore, ParameterValue};
use tracing::{debug, info, instrument};

use crate::error::{SweepError, SweepResult};
use crate::node::NodeDescriptor;
use crate::persist::RunDirectory;

/// Shared inputs of every compilation in a run.
pub struct CompilationStage<'a> {
    store: &'a ParameterStore,
    compiler: &'a dyn ExperimentCompiler,
    device_fields: &'a [String],
}

impl<'a> CompilationStage<'a> {
    /// Create a stage compiling with `compiler`.
    ///
    /// `device_fields` are copied into every snapshot in addition to the
    /// node's prerequisites and owned fields.
    pub fn new(
        store: &'a ParameterStore,
        compiler: &'a dyn ExperimentCompiler,
        device_fields: &'a [String],
    ) -> Self {
        Self {
            store,
            compiler,
            device_fields,
        }
    }

    /// Back up, snapshot, check prerequisites and compile.
    ///
    /// Uses the node's current reduced external samplespace as overrides.
    #[instrument(skip_all, fields(node = %node.name))]
    pub async fn compile(
        &self,
        node: &NodeDescriptor,
        run_dir: &RunDirectory,
    ) -> SweepResult<CompiledProgram> {
        if node.backup {
            self.backup_owned_fields(node).await?;
        }

        let mut device = self.snapshot(node).await?;
        let applied = device.apply_overrides(&node.reduced_external);
        debug!("Applied {} external overrides", applied);

        check_prerequisites(node, &device)?;

        let experiment = node
            .hooks
            .build_experiment(node, &device)
            .map_err(|e| SweepError::hook("build_experiment", e))?;
        let request = CompileRequest {
            node: &node.name,
            device: &device,
            schedule: &node.schedule,
            external: &node.reduced_external,
            experiment: &experiment,
        };
        let program = self
            .compiler
            .compile(&request)
            .map_err(SweepError::Compiler)?;

        run_dir.write_snapshot(&device)?;
        info!(
            "Compiled {} with {} ({} acquisitions, est. {:?})",
            node.name,
            self.compiler.name(),
            program.acquisitions.len(),
            program.estimated_duration
        );
        Ok(program)
    }

    /// Read every field the node's compilation may touch.
    pub async fn snapshot(&self, node: &NodeDescriptor) -> SweepResult<DeviceSnapshot> {
        let mut fields: Vec<&str> = Vec::new();
        for field in self
            .device_fields
            .iter()
            .chain(&node.prerequisites)
            .chain(&node.owned_fields)
        {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }

        let mut device = DeviceSnapshot::new();
        for element in node.kind.elements() {
            for field in &fields {
                let value = match self.store.parameter(&element, field).await? {
                    ParameterValue::Calibrated(v) => Some(v),
                    ParameterValue::Uncalibrated | ParameterValue::NotFound => None,
                };
                device.insert(element.clone(), *field, value);
            }
        }
        Ok(device)
    }

    async fn backup_owned_fields(&self, node: &NodeDescriptor) -> SweepResult<()> {
        let targets = node
            .kind
            .target_qubits()
            .iter()
            .chain(node.kind.target_couplers());
        for element in targets {
            for field in &node.owned_fields {
                match self.store.backup(element, field).await? {
                    BackupOutcome::BackedUp { previous } => {
                        debug!("Backed up {}/{} (was {})", element, field, previous);
                    }
                    BackupOutcome::AlreadyBackedUp => {
                        debug!("{}/{} already backed up", element, field);
                    }
                    BackupOutcome::NothingToBackUp => {}
                }
            }
        }
        Ok(())
    }
}

/// Every prerequisite must be calibrated on every target qubit.
fn check_prerequisites(node: &NodeDescriptor, device: &DeviceSnapshot) -> SweepResult<()> {
    let missing = node.kind.target_qubits().iter().find_map(|qubit: &PhysicalElement| {
        node.prerequisites
            .iter()
            .find(|field| device.get(qubit, field).is_none())
            .map(|field| (qubit, field))
    });
    match missing {
        Some((element, field)) => Err(SweepError::PrerequisiteMissing {
            element: element.to_string(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}
