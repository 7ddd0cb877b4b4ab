//! End-to-end tests of the sweep orchestrator against the simulated hardware.
//!
//! Each test builds a node over two qubits, runs it through
//! [`SweepOrchestrator`] and checks what was compiled, measured, merged and
//! written back to the parameter store.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use qcal_adapter_sim::{SimulatedCompiler, SimulatedDriver};
use qcal_core::{PhysicalElement, Samplespace, SamplespaceError, SettableQuantity, linspace};
use qcal_hal::{DeviceSnapshot, Experiment};
use qcal_store::{NodeStatus, ParameterStore, ParameterValue};
use qcal_sweep::{
    AssembledDataset, AxisRole, ExecutionConfig, NodeDescriptor, NodeHooks, NodeKind,
    SweepError, SweepOrchestrator, SweepType, load_dataset,
};
use tempfile::TempDir;

const OWNED: &str = "clock_freqs:readout";
const AMP: &str = "measure:pulse_amp";

// ============================================================================
// Helpers
// ============================================================================

/// Hooks that record every call and can be told to fail.
#[derive(Default)]
struct RecordingHooks {
    pre_measurements: Mutex<Vec<f64>>,
    built_with_amp: Mutex<Vec<Option<f64>>>,
    analyzed: Mutex<Option<AssembledDataset>>,
    fail_pre_measurement_at: Option<usize>,
    fail_analysis: bool,
}

impl RecordingHooks {
    fn pre_measurements(&self) -> Vec<f64> {
        self.pre_measurements.lock().unwrap().clone()
    }

    fn built_with_amp(&self) -> Vec<Option<f64>> {
        self.built_with_amp.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeHooks for RecordingHooks {
    async fn pre_measurement(
        &self,
        _store: &ParameterStore,
        external: &Samplespace,
    ) -> anyhow::Result<()> {
        let mut calls = self.pre_measurements.lock().unwrap();
        if self.fail_pre_measurement_at == Some(calls.len()) {
            anyhow::bail!("flux source did not settle");
        }
        let value = external
            .quantities()
            .first()
            .and_then(|q| q.values_for(&q00()))
            .and_then(|v| v.first().copied())
            .unwrap_or(f64::NAN);
        calls.push(value);
        Ok(())
    }

    fn build_experiment(
        &self,
        node: &NodeDescriptor,
        device: &DeviceSnapshot,
    ) -> anyhow::Result<Experiment> {
        self.built_with_amp.lock().unwrap().push(device.get(&q00(), AMP));
        Ok(Experiment::new(
            node.name.clone(),
            node.kind.target_qubits().to_vec(),
        ))
    }

    async fn analyze(
        &self,
        node: &NodeDescriptor,
        dataset: &AssembledDataset,
        store: &ParameterStore,
    ) -> anyhow::Result<()> {
        *self.analyzed.lock().unwrap() = Some(dataset.clone());
        if self.fail_analysis {
            anyhow::bail!("fit did not converge");
        }
        for qubit in node.kind.target_qubits() {
            store.set_value(qubit, OWNED, 6.05e9).await?;
        }
        Ok(())
    }
}

fn q00() -> PhysicalElement {
    PhysicalElement::qubit("q00")
}

fn q01() -> PhysicalElement {
    PhysicalElement::qubit("q01")
}

fn frequencies() -> Samplespace {
    let values = linspace(6.0e9, 6.1e9, 5);
    Samplespace::new()
        .with_quantity(
            SettableQuantity::new("readout_frequencies", "Hz")
                .with_values(q00(), values.clone())
                .with_values(q01(), values),
        )
        .unwrap()
}

fn external(name: &str, values: Vec<f64>) -> Samplespace {
    Samplespace::new()
        .with_quantity(
            SettableQuantity::new(name, "V")
                .with_values(q00(), values.clone())
                .with_values(q01(), values),
        )
        .unwrap()
}

fn node(hooks: Arc<RecordingHooks>) -> NodeDescriptor {
    NodeDescriptor::new(
        "resonator_spectroscopy",
        NodeKind::qubits(vec![q00(), q01()]),
        hooks,
    )
    .with_schedule(frequencies())
    .with_owned_fields([OWNED])
}

async fn seeded_store() -> ParameterStore {
    let store = ParameterStore::in_memory();
    for qubit in [q00(), q01()] {
        store.set_value(&qubit, OWNED, 6.02e9).await.unwrap();
        store.set_value(&qubit, AMP, 0.05).await.unwrap();
    }
    store
}

struct Harness {
    orchestrator: SweepOrchestrator,
    compiler: Arc<SimulatedCompiler>,
    runs: Arc<std::sync::atomic::AtomicUsize>,
    _output: TempDir,
}

fn harness(store: ParameterStore, driver: SimulatedDriver) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let compiler = Arc::new(SimulatedCompiler::new());
    let runs = driver.run_counter();
    let orchestrator = SweepOrchestrator::new(
        store,
        compiler.clone(),
        Box::new(driver.with_time_scale(0.0)),
        output.path(),
    )
    .with_device_fields(vec![AMP.to_string()])
    .with_execution(ExecutionConfig {
        timeout: Duration::from_secs(5),
        progress: false,
    });
    Harness {
        orchestrator,
        compiler,
        runs,
        _output: output,
    }
}

// ============================================================================
// Simple sweeps
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_simple_sweep_single_pass() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks.clone());

    let outcome = h.orchestrator.run(&mut node).await.unwrap();

    assert_eq!(h.compiler.compilations(), 1);
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.iterations, 1);
    assert!(hooks.pre_measurements().is_empty());

    let values = &outcome.dataset.get(&q00()).unwrap().values;
    assert_eq!(values.shape(), &[5]);
    assert_eq!(values.axes[0].coords, linspace(6.0e9, 6.1e9, 5));

    assert_eq!(outcome.datasets.len(), 1);
    assert!(outcome.datasets[0].starts_with(&outcome.run_dir));
    let loaded = load_dataset(&outcome.datasets[0]).unwrap();
    assert_eq!(loaded, outcome.dataset);

    let store = h.orchestrator.store();
    assert_eq!(
        store.get(&q00(), "clock_freqs:readout_backup").await.unwrap(),
        Some("6020000000".to_string())
    );
    assert_eq!(
        store.parameter(&q00(), OWNED).await.unwrap(),
        ParameterValue::Calibrated(6.05e9)
    );
    assert_eq!(
        store.status(&q01(), "resonator_spectroscopy").await.unwrap(),
        NodeStatus::Calibrated
    );
}

#[tokio::test(start_paused = true)]
async fn test_simple_sweep_reuses_program() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks.clone()).with_external(external("dc_current", vec![0.0, 1e-3, 2e-3]));

    let outcome = h.orchestrator.run(&mut node).await.unwrap();

    assert_eq!(h.compiler.compilations(), 1);
    assert_eq!(h.runs.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(hooks.pre_measurements(), vec![0.0, 1e-3, 2e-3]);

    let values = &outcome.dataset.get(&q01()).unwrap().values;
    assert_eq!(values.shape(), &[5, 3]);
    assert_eq!(values.axes[1].role, AxisRole::External);
    // One file per iteration plus the merged dataset.
    assert_eq!(outcome.datasets.len(), 4);
    assert_eq!(load_dataset(outcome.datasets.last().unwrap()).unwrap(), outcome.dataset);
}

// ============================================================================
// Parameterized sweeps
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_parameterized_sweep_recompiles_in_order() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks.clone())
        .with_sweep_type(SweepType::Parameterized)
        .with_external(external(AMP, vec![0.1, 0.2, 0.3]));

    let outcome = h.orchestrator.run(&mut node).await.unwrap();

    assert_eq!(h.compiler.compilations(), 3);
    assert_eq!(h.runs.load(Ordering::SeqCst), 3);
    assert_eq!(hooks.pre_measurements(), vec![0.1, 0.2, 0.3]);
    // The active slice overrides the stored amplitude in every compilation.
    assert_eq!(hooks.built_with_amp(), vec![Some(0.1), Some(0.2), Some(0.3)]);
    assert!(node.reduced_external.is_reduced());
    assert_eq!(outcome.dataset.get(&q00()).unwrap().values.shape(), &[5, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_parameterized_sweep_without_external_runs_once() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks.clone()).with_sweep_type(SweepType::Parameterized);

    let outcome = h.orchestrator.run(&mut node).await.unwrap();

    assert_eq!(h.compiler.compilations(), 1);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(hooks.built_with_amp(), vec![Some(0.05)]);
}

#[tokio::test(start_paused = true)]
async fn test_backup_survives_recompilation() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks)
        .with_sweep_type(SweepType::Parameterized)
        .with_external(external(AMP, vec![0.1, 0.2, 0.3]));

    h.orchestrator.run(&mut node).await.unwrap();

    assert_eq!(
        h.orchestrator
            .store()
            .get(&q01(), "clock_freqs:readout_backup")
            .await
            .unwrap(),
        Some("6020000000".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_merge_on_disjoint_coordinates() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let schedule = Samplespace::new()
        .with_quantity(
            SettableQuantity::new("x", "")
                .with_values(q00(), vec![1.0, 2.0, 3.0])
                .with_values(q01(), vec![1.0, 2.0, 3.0]),
        )
        .unwrap();
    let mut node = node(hooks)
        .with_schedule(schedule)
        .with_sweep_type(SweepType::Parameterized)
        .with_external(external("flux", vec![0.5, 0.7]));

    let outcome = h.orchestrator.run(&mut node).await.unwrap();

    let values = &outcome.dataset.get(&q00()).unwrap().values;
    assert_eq!(values.data.len(), 6);
    for x in [1.0, 2.0, 3.0] {
        for flux in [0.5, 0.7] {
            let value = values.value_at(&[x, flux]).unwrap();
            assert!(value.re.is_finite(), "missing ({x}, {flux})");
        }
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_mid_sweep_keeps_earlier_data() {
    let hooks = Arc::new(RecordingHooks {
        fail_pre_measurement_at: Some(1),
        ..Default::default()
    });
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks)
        .with_sweep_type(SweepType::Parameterized)
        .with_external(external(AMP, vec![0.1, 0.2, 0.3]));

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert_eq!(failed.node, "resonator_spectroscopy");
    assert_eq!(failed.iteration, 1);
    assert!(matches!(failed.source, SweepError::Hook { hook: "pre_measurement", .. }));
    assert_eq!(h.compiler.compilations(), 1);

    let partial = failed.partial.as_ref().unwrap();
    let values = &partial.get(&q00()).unwrap().values;
    assert_eq!(values.axis(AMP).unwrap().coords, vec![0.1]);
    let last = failed.last_dataset.as_ref().unwrap();
    assert!(last.ends_with(format!("dataset_0.{}", qcal_sweep::DATASET_EXTENSION)));
    assert!(failed.to_string().contains(&last.display().to_string()));

    assert_eq!(
        h.orchestrator
            .store()
            .status(&q00(), "resonator_spectroscopy")
            .await
            .unwrap(),
        NodeStatus::NotCalibrated
    );
}

#[tokio::test(start_paused = true)]
async fn test_analysis_failure_returns_merged_data() {
    let hooks = Arc::new(RecordingHooks {
        fail_analysis: true,
        ..Default::default()
    });
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks).with_external(external("dc_current", vec![0.0, 1e-3]));

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert!(matches!(failed.source, SweepError::Hook { hook: "analysis", .. }));
    assert_eq!(failed.iteration, 1);
    let partial = failed.partial.unwrap();
    assert_eq!(partial.get(&q00()).unwrap().values.shape(), &[5, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_mismatch_is_fatal() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new().dropping_acquisition(1));
    let mut node = node(hooks.clone());

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    match failed.source {
        SweepError::AcquisitionMismatch { expected, found } => {
            assert_eq!(expected.into_iter().collect::<Vec<_>>(), vec![0, 1]);
            assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![0]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(failed.partial.is_none());
    assert!(hooks.analyzed.lock().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_hardware_timeout_is_fatal() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new().hanging());
    let mut node = node(hooks).with_external(external("dc_current", vec![0.0, 1e-3]));

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert!(matches!(failed.source, SweepError::HardwareTimeout(t) if t == Duration::from_secs(5)));
    assert_eq!(failed.iteration, 0);
    assert_eq!(h.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_prerequisite_stops_before_compiling() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let mut node = node(hooks).with_prerequisites(["clock_freqs:f01"]);

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    match &failed.source {
        SweepError::PrerequisiteMissing { element, field } => {
            assert_eq!(element, "q00");
            assert_eq!(field, "clock_freqs:f01");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.compiler.compilations(), 0);
    assert_eq!(h.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_uncalibrated_prerequisite_is_missing() {
    let hooks = Arc::new(RecordingHooks::default());
    let store = seeded_store().await;
    store.set_value(&q00(), "clock_freqs:f01", 4.1e9).await.unwrap();
    store.set(&q01(), "clock_freqs:f01", "nan").await.unwrap();
    let mut h = harness(store, SimulatedDriver::new());
    let mut node = node(hooks).with_prerequisites(["clock_freqs:f01"]);

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert!(matches!(
        &failed.source,
        SweepError::PrerequisiteMissing { element, .. } if element == "q01"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_fit_result_is_not_a_prerequisite() {
    let hooks = Arc::new(RecordingHooks::default());
    let store = seeded_store().await;
    store.set_value(&q00(), "clock_freqs:f01", 4.1e9).await.unwrap();
    store.set_value(&q01(), "clock_freqs:f01", f64::NAN).await.unwrap();
    let mut h = harness(store, SimulatedDriver::new());
    let mut node = node(hooks).with_prerequisites(["clock_freqs:f01"]);

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert!(matches!(
        &failed.source,
        SweepError::PrerequisiteMissing { element, .. } if element == "q01"
    ));
    assert_eq!(h.compiler.compilations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_external_sweep_must_cover_every_measured_qubit() {
    let hooks = Arc::new(RecordingHooks::default());
    let mut h = harness(seeded_store().await, SimulatedDriver::new());
    let flux_on_q00 = Samplespace::new()
        .with_quantity(SettableQuantity::new("flux", "V").with_values(q00(), vec![0.5, 0.7]))
        .unwrap();
    let mut node = node(hooks.clone())
        .with_sweep_type(SweepType::Parameterized)
        .with_external(flux_on_q00);

    let failed = h.orchestrator.run(&mut node).await.unwrap_err();

    assert!(matches!(
        &failed.source,
        SweepError::Samplespace(SamplespaceError::UncoveredElement(element)) if element == "q01"
    ));
    assert_eq!(h.compiler.compilations(), 0);
    assert_eq!(h.runs.load(Ordering::SeqCst), 0);
    assert!(hooks.pre_measurements().is_empty());
}
