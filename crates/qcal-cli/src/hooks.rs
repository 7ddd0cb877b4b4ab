//! Node hooks driven by the configuration file.
//!
//! The experiment body tells the simulated compiler which response to
//! produce. Analysis takes the mean magnitude along one axis (the first
//! schedule axis unless configured) and writes the coordinate of its minimum
//! or maximum to the node's first owned field. Coupler nodes write the mean
//! over the coupler's qubits to the coupler.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qcal_adapter_sim::{SignalModel, SimExperiment};
use qcal_core::{PhysicalElement, Samplespace};
use qcal_hal::{DeviceSnapshot, Experiment};
use qcal_store::ParameterStore;
use qcal_sweep::{AssembledDataset, LabeledArray, NodeDescriptor, NodeHooks, ReshapeHints};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which point of the response is the calibrated value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extremum {
    /// Dip (resonator, qubit spectroscopy).
    #[default]
    Min,
    /// Peak.
    Max,
}

/// Result extraction settings of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Field receiving the result; the first owned field when omitted.
    #[serde(default)]
    pub field: Option<String>,

    /// Axis to pick the coordinate from; the first axis when omitted.
    #[serde(default)]
    pub axis: Option<String>,

    /// Point of the response to pick.
    #[serde(default)]
    pub extremum: Extremum,
}

/// Hooks of a configured node.
pub struct ConfigHooks {
    signal: SignalModel,
    analysis: AnalysisConfig,
    reshape: ReshapeHints,
}

impl ConfigHooks {
    pub fn new(signal: SignalModel, analysis: AnalysisConfig, reshape: ReshapeHints) -> Self {
        Self {
            signal,
            analysis,
            reshape,
        }
    }
}

#[async_trait]
impl NodeHooks for ConfigHooks {
    async fn pre_measurement(&self, _store: &ParameterStore, external: &Samplespace) -> Result<()> {
        for quantity in external.quantities() {
            for (element, values) in &quantity.values {
                if let Some(value) = values.first() {
                    info!("Setting {} = {} {} on {}", quantity.name, value, quantity.unit, element);
                }
            }
        }
        Ok(())
    }

    fn build_experiment(&self, node: &NodeDescriptor, _device: &DeviceSnapshot) -> Result<Experiment> {
        let body = SimExperiment {
            signal: self.signal,
            repetitions: self.reshape.shots.or(self.reshape.loop_repetitions),
            calibration_points: self.reshape.calibration_points,
        };
        Ok(Experiment::new(node.name.clone(), node.kind.target_qubits().to_vec())
            .with_body(serde_json::to_value(body)?))
    }

    async fn analyze(
        &self,
        node: &NodeDescriptor,
        dataset: &AssembledDataset,
        store: &ParameterStore,
    ) -> Result<()> {
        let Some(field) = self.analysis.field.as_ref().or(node.owned_fields.first()) else {
            debug!("{} has no field to update", node.name);
            return Ok(());
        };

        let mut results = BTreeMap::new();
        for (element, data) in &dataset.elements {
            let value = optimum(&data.values, self.analysis.axis.as_deref(), self.analysis.extremum)
                .with_context(|| format!("No finite data for {element}"))?;
            results.insert(element.clone(), value);
        }

        let couplers = node.kind.target_couplers();
        let results = if couplers.is_empty() {
            results
        } else {
            per_coupler(couplers, &results)
        };
        for (element, value) in &results {
            store.set_value(element, field, *value).await?;
            info!("{}: {} {} = {}", node.name, element, field, value);
        }
        Ok(())
    }
}

/// Mean of the qubit results of every coupler.
fn per_coupler(
    couplers: &[PhysicalElement],
    qubits: &BTreeMap<PhysicalElement, f64>,
) -> BTreeMap<PhysicalElement, f64> {
    couplers
        .iter()
        .filter_map(|coupler| {
            let values: Vec<f64> = coupler
                .qubits()
                .iter()
                .filter_map(|q| qubits.get(q).copied())
                .collect();
            (!values.is_empty())
                .then(|| (coupler.clone(), values.iter().sum::<f64>() / values.len() as f64))
        })
        .collect()
}

/// Coordinate of the extremum of the mean magnitude along one axis.
///
/// Every other axis is averaged over; NaN points (merge gaps) are ignored.
pub fn optimum(values: &LabeledArray, axis: Option<&str>, extremum: Extremum) -> Option<f64> {
    let index = match axis {
        Some(name) => values.axes.iter().position(|a| a.name == name)?,
        None => 0,
    };
    let axis = values.axes.get(index)?;
    let profile: Vec<f64> = (0..axis.len())
        .map(|i| {
            let (sum, count) = values
                .data
                .index_axis(ndarray::Axis(index), i)
                .iter()
                .filter(|v| v.re.is_finite() && v.im.is_finite())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v.norm(), count + 1));
            if count == 0 { f64::NAN } else { sum / count as f64 }
        })
        .collect();

    let finite = profile.iter().enumerate().filter(|(_, v)| v.is_finite());
    let best = match extremum {
        Extremum::Min => finite.min_by(|a, b| a.1.total_cmp(b.1)),
        Extremum::Max => finite.max_by(|a, b| a.1.total_cmp(b.1)),
    };
    best.map(|(i, _)| axis.coords[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use num_complex::Complex64;
    use qcal_sweep::{Axis, AxisRole};

    fn array(coords: Vec<f64>, rows: &[[f64; 2]]) -> LabeledArray {
        let data: Vec<Complex64> = rows
            .iter()
            .flat_map(|r| r.iter().map(|&v| Complex64::new(v, 0.0)))
            .collect();
        LabeledArray::new(
            vec![
                Axis::new("x", "Hz", AxisRole::Schedule, coords),
                Axis::new("flux", "V", AxisRole::External, vec![0.0, 1.0]),
            ],
            ArrayD::from_shape_vec(IxDyn(&[rows.len(), 2]), data).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_optimum_averages_trailing_axes() {
        let values = array(vec![1.0, 2.0, 3.0], &[[0.9, 0.9], [0.3, 0.5], [0.1, 1.0]]);
        assert_eq!(optimum(&values, None, Extremum::Min), Some(2.0));
        assert_eq!(optimum(&values, None, Extremum::Max), Some(1.0));
    }

    #[test]
    fn test_optimum_along_named_axis() {
        let values = array(vec![1.0, 2.0, 3.0], &[[0.9, 0.1], [0.3, 0.5], [0.1, 0.2]]);
        assert_eq!(optimum(&values, Some("flux"), Extremum::Min), Some(1.0));
        assert_eq!(optimum(&values, Some("missing"), Extremum::Min), None);
    }

    #[test]
    fn test_coupler_result_is_qubit_mean() {
        let coupler = PhysicalElement::coupler("q00_q01").unwrap();
        let qubits = BTreeMap::from([
            (PhysicalElement::qubit("q00"), 1.0),
            (PhysicalElement::qubit("q01"), 3.0),
        ]);
        let results = per_coupler(&[coupler.clone()], &qubits);
        assert_eq!(results.get(&coupler), Some(&2.0));
    }

    #[test]
    fn test_optimum_skips_gaps() {
        let values = array(vec![1.0, 2.0], &[[f64::NAN, f64::NAN], [0.5, f64::NAN]]);
        assert_eq!(optimum(&values, None, Extremum::Min), Some(2.0));
    }

    #[test]
    fn test_experiment_body_carries_reshape() {
        let hooks = ConfigHooks::new(
            SignalModel::Rabi { period: 0.4 },
            AnalysisConfig::default(),
            ReshapeHints {
                calibration_points: 2,
                shots: Some(64),
                loop_repetitions: None,
            },
        );
        let node = NodeDescriptor::new(
            "rabi",
            qcal_sweep::NodeKind::qubits(vec![qcal_core::PhysicalElement::qubit("q00")]),
            std::sync::Arc::new(ConfigHooks::new(
                SignalModel::default(),
                AnalysisConfig::default(),
                ReshapeHints::default(),
            )),
        );

        let experiment = hooks.build_experiment(&node, &DeviceSnapshot::new()).unwrap();
        let body: SimExperiment = serde_json::from_value(experiment.body).unwrap();
        assert_eq!(body.repetitions, Some(64));
        assert_eq!(body.calibration_points, 2);
        assert_eq!(experiment.measured.len(), 1);
    }
}
