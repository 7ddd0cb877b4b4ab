//! Simulated experiment compiler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use qcal_hal::{AcquisitionChannel, CompileRequest, CompiledProgram, ExperimentCompiler, HalError, HalResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Noiseless response the simulated hardware returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SignalModel {
    /// The same level everywhere.
    Flat { level: f64 },
    /// A dip of `depth` centred on `center` (resonator spectroscopy).
    Lorentzian { center: f64, width: f64, depth: f64 },
    /// `cos²(π x / period)` oscillation (Rabi amplitude sweep).
    Rabi { period: f64 },
}

impl Default for SignalModel {
    fn default() -> Self {
        SignalModel::Flat { level: 1.0 }
    }
}

impl SignalModel {
    /// Response at sweep coordinate `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        match *self {
            SignalModel::Flat { level } => level,
            SignalModel::Lorentzian {
                center,
                width,
                depth,
            } => {
                let detuning = (x - center) / (width / 2.0);
                1.0 - depth / (1.0 + detuning * detuning)
            }
            SignalModel::Rabi { period } => (std::f64::consts::PI * x / period).cos().powi(2),
        }
    }
}

/// Experiment body understood by [`SimulatedCompiler`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimExperiment {
    /// Response model.
    pub signal: SignalModel,
    /// Repetitions of the whole sweep (shots or loop repetitions).
    pub repetitions: Option<usize>,
    /// Reference values appended after the sweep data.
    pub calibration_points: usize,
}

/// One acquisition of a simulated program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimAcquisition {
    /// Acquisition index.
    pub index: u32,
    /// Noiseless values in emission order.
    pub signal: Vec<f64>,
}

/// Payload of a program compiled by [`SimulatedCompiler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimProgram {
    /// Acquisitions in declaration order.
    pub acquisitions: Vec<SimAcquisition>,
}

/// Compiles experiments into programs for [`SimulatedDriver`](crate::SimulatedDriver).
///
/// Each measured element gets one acquisition; its buffer holds the signal
/// model evaluated on the element's first schedule axis, which varies
/// fastest.
#[derive(Debug)]
pub struct SimulatedCompiler {
    point_duration: Duration,
    compilations: AtomicUsize,
}

impl SimulatedCompiler {
    /// Create a compiler estimating 10 µs per acquired point.
    pub fn new() -> Self {
        Self {
            point_duration: Duration::from_micros(10),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Set the estimated hardware time per acquired point.
    #[must_use]
    pub fn with_point_duration(mut self, point_duration: Duration) -> Self {
        self.point_duration = point_duration;
        self
    }

    /// Number of successful compilations so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentCompiler for SimulatedCompiler {
    fn name(&self) -> &str {
        "simulated"
    }

    #[instrument(skip_all, fields(node = request.node))]
    fn compile(&self, request: &CompileRequest<'_>) -> HalResult<CompiledProgram> {
        let body = &request.experiment.body;
        let experiment: SimExperiment = if body.is_null() {
            SimExperiment::default()
        } else {
            serde_json::from_value(body.clone())?
        };
        if request.experiment.measured.is_empty() {
            return Err(HalError::Compilation(format!(
                "experiment '{}' measures no element",
                request.experiment.name
            )));
        }

        let repetitions = experiment.repetitions.unwrap_or(1);
        let mut channels = Vec::new();
        let mut acquisitions = Vec::new();
        let mut points_total = 0usize;
        for (index, element) in request.experiment.measured.iter().enumerate() {
            let index = index as u32;
            let axes = request.schedule.for_element(element);
            let sweep_points: usize = axes.iter().map(|(_, values)| values.len()).product();
            let fastest = axes.first().map(|(_, values)| *values).unwrap_or(&[]);

            let mut signal = Vec::with_capacity(sweep_points * repetitions + experiment.calibration_points);
            for point in 0..sweep_points * repetitions {
                let x = if fastest.is_empty() {
                    0.0
                } else {
                    fastest[point % fastest.len()]
                };
                signal.push(experiment.signal.evaluate(x));
            }
            signal.extend((0..experiment.calibration_points).map(|i| (i % 2) as f64));
            points_total += signal.len();

            channels.push(AcquisitionChannel {
                index,
                element: element.clone(),
            });
            acquisitions.push(SimAcquisition { index, signal });
        }

        let estimated_duration = self.point_duration * points_total as u32;
        let payload = serde_json::to_value(SimProgram { acquisitions })?;
        self.compilations.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Compiled {} acquisitions, {} points",
            channels.len(),
            points_total
        );
        Ok(CompiledProgram::new(request.node, channels, estimated_duration).with_payload(payload))
    }
}
