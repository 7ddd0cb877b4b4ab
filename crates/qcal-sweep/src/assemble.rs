//! Dataset assembly: raw acquisition buffers to labeled arrays.
//!
//! The hardware emits values with the first declared schedule quantity
//! varying fastest. A buffer for quantities `x` (len 3) and `y` (len 2) is
//! laid out as
//!
//! ```text
//!   (x0,y0) (x1,y0) (x2,y0) (x0,y1) (x1,y1) (x2,y1) [cal0 cal1 ...]
//! ```
//!
//! so it is reshaped with the emission order reversed (`[y, x]`) and the axes
//! are permuted back into declaration order (`[x, y]`). A shot axis is
//! outermost in the buffer; loop repetitions sit directly after the first
//! declared axis. Either way it ends up after the schedule axes. External
//! quantities become trailing length-1 axes holding the active slice value.

use ndarray::{ArrayD, Axis as ArrayAxis, IxDyn};
use num_complex::Complex64;
use qcal_core::{PhysicalElement, Samplespace};
use qcal_hal::{AcquisitionChannel, CompiledProgram, RawResult};
use tracing::{debug, instrument};

use crate::dataset::{AssembledDataset, Axis, AxisRole, ElementDataset, LabeledArray};
use crate::error::{AssemblyError, AssemblyResult};
use crate::node::{NodeDescriptor, ReshapeHints};

/// Axis name for repeated shots.
pub const SHOT_AXIS: &str = "shot";
/// Axis name for loop repetitions.
pub const LOOP_AXIS: &str = "loop_repetition";
/// Axis name for calibration reference slots.
pub const CALIBRATION_AXIS: &str = "calibration_point";

/// Where the repetition axis sits in the buffer.
#[derive(Debug, Clone, Copy)]
enum Repetition {
    Shots(usize),
    Loop(usize),
}

impl Repetition {
    fn from_hints(hints: &ReshapeHints) -> AssemblyResult<Option<Self>> {
        match (hints.shots, hints.loop_repetitions) {
            (Some(shots), Some(loop_repetitions)) => Err(AssemblyError::ConflictingHints {
                shots,
                loop_repetitions,
            }),
            (Some(shots), None) => Ok(Some(Repetition::Shots(shots))),
            (None, Some(repetitions)) => Ok(Some(Repetition::Loop(repetitions))),
            (None, None) => Ok(None),
        }
    }

    fn axis(self) -> Axis {
        match self {
            Repetition::Shots(n) => Axis::index(SHOT_AXIS, AxisRole::Repetition, n),
            Repetition::Loop(n) => Axis::index(LOOP_AXIS, AxisRole::Repetition, n),
        }
    }
}

/// Shape every acquisition of `raw` into the node's dataset.
///
/// Uses the node's schedule samplespace and its active external slice.
#[instrument(skip_all, fields(node = %node.name))]
pub fn assemble(
    mut raw: RawResult,
    program: &CompiledProgram,
    node: &NodeDescriptor,
) -> AssemblyResult<AssembledDataset> {
    node.schedule.validate()?;
    node.reduced_external.validate()?;
    let repetition = Repetition::from_hints(&node.reshape)?;

    let mut dataset = AssembledDataset::new(node.name.clone());
    for channel in &program.acquisitions {
        let buffer = raw
            .take(channel.index)
            .ok_or_else(|| AssemblyError::MissingAcquisition {
                index: channel.index,
                element: channel.element.to_string(),
            })?;
        let data = assemble_channel(
            channel,
            buffer,
            &node.schedule,
            &node.reduced_external,
            node.reshape.calibration_points,
            repetition,
        )?;
        debug!(
            "Assembled {} (acquisition {}): shape {:?}",
            channel.element,
            channel.index,
            data.values.shape()
        );
        dataset.insert(data);
    }
    Ok(dataset)
}

fn assemble_channel(
    channel: &AcquisitionChannel,
    buffer: ArrayD<Complex64>,
    schedule: &Samplespace,
    external: &Samplespace,
    calibration_points: usize,
    repetition: Option<Repetition>,
) -> AssemblyResult<ElementDataset> {
    let element = &channel.element;
    let mut flat: Vec<Complex64> = buffer.iter().copied().collect();

    // Declaration order; the repetition axis, if any, is last.
    let mut axes: Vec<Axis> = schedule
        .for_element(element)
        .into_iter()
        .map(|(quantity, values)| {
            let axis = Axis::new(
                quantity.name.clone(),
                quantity.unit.clone(),
                AxisRole::Schedule,
                values.to_vec(),
            );
            match quantity.key_covering(element) {
                Some(key) => axis.with_element(key.clone()),
                None => axis,
            }
        })
        .collect();
    let declared = axes.len();

    // Emission order, fastest axis first.
    let mut emission: Vec<usize> = (0..declared).collect();
    if let Some(repetition) = repetition {
        axes.push(repetition.axis());
        match repetition {
            Repetition::Shots(_) => emission.push(declared),
            Repetition::Loop(_) => emission.insert(declared.min(1), declared),
        }
    }

    let expected: usize = axes.iter().map(Axis::len).product();
    if flat.len() < calibration_points || flat.len() - calibration_points != expected {
        return Err(AssemblyError::ShapeMismatch {
            element: element.to_string(),
            expected: expected + calibration_points,
            found: flat.len(),
        });
    }
    let reference = flat.split_off(expected);

    let reversed: Vec<usize> = emission.iter().rev().copied().collect();
    let reversed_shape: Vec<usize> = reversed.iter().map(|&a| axes[a].len()).collect();
    let permutation: Vec<usize> = (0..axes.len())
        .map(|target| reversed.iter().position(|&a| a == target).unwrap_or(target))
        .collect();
    let mut data = ArrayD::from_shape_vec(IxDyn(&reversed_shape), flat)?
        .permuted_axes(IxDyn(&permutation))
        .as_standard_layout()
        .into_owned();

    let external_axes = external_axes(external, element);
    for _ in &external_axes {
        let ndim = data.ndim();
        data = data.insert_axis(ArrayAxis(ndim));
    }
    axes.extend(external_axes.iter().cloned());
    let values = LabeledArray::new(axes, data)?;

    let calibration = if calibration_points > 0 {
        let mut cal_axes = vec![Axis::index(
            CALIBRATION_AXIS,
            AxisRole::Calibration,
            calibration_points,
        )];
        let mut shape = vec![calibration_points];
        shape.extend(std::iter::repeat_n(1, external_axes.len()));
        cal_axes.extend(external_axes);
        let cal_data = ArrayD::from_shape_vec(IxDyn(&shape), reference)?;
        Some(LabeledArray::new(cal_axes, cal_data)?)
    } else {
        None
    };

    Ok(ElementDataset {
        element: element.clone(),
        acquisition: channel.index,
        values,
        calibration,
    })
}

/// Length-1 axes carrying the active external slice for `element`.
fn external_axes(external: &Samplespace, element: &PhysicalElement) -> Vec<Axis> {
    external
        .for_element(element)
        .into_iter()
        .filter_map(|(quantity, values)| {
            let value = *values.first()?;
            let axis = Axis::new(
                quantity.name.clone(),
                quantity.unit.clone(),
                AxisRole::External,
                vec![value],
            );
            Some(match quantity.key_covering(element) {
                Some(key) => axis.with_element(key.clone()),
                None => axis,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::node::{NodeHooks, NodeKind};
    use async_trait::async_trait;
    use ndarray::Array1;
    use qcal_core::SettableQuantity;
    use qcal_hal::{DeviceSnapshot, Experiment};
    use qcal_store::ParameterStore;

    struct NoHooks;

    #[async_trait]
    impl NodeHooks for NoHooks {
        fn build_experiment(
            &self,
            node: &NodeDescriptor,
            _device: &DeviceSnapshot,
        ) -> anyhow::Result<Experiment> {
            Ok(Experiment::new(node.name.clone(), vec![]))
        }

        async fn analyze(
            &self,
            _node: &NodeDescriptor,
            _dataset: &AssembledDataset,
            _store: &ParameterStore,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn q00() -> PhysicalElement {
        PhysicalElement::qubit("q00")
    }

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn program() -> CompiledProgram {
        CompiledProgram::new(
            "test",
            vec![AcquisitionChannel {
                index: 0,
                element: q00(),
            }],
            Duration::from_millis(1),
        )
    }

    fn node(schedule: Samplespace) -> NodeDescriptor {
        NodeDescriptor::new("test", NodeKind::qubits(vec![q00()]), Arc::new(NoHooks))
            .with_schedule(schedule)
    }

    fn raw(values: Vec<f64>) -> RawResult {
        let buffer = Array1::from_iter(values.into_iter().map(c)).into_dyn();
        RawResult::new().with_acquisition(0, buffer)
    }

    fn two_axes() -> Samplespace {
        Samplespace::new()
            .with_quantity(SettableQuantity::new("x", "Hz").with_values(q00(), vec![10.0, 20.0, 30.0]))
            .unwrap()
            .with_quantity(SettableQuantity::new("y", "V").with_values(q00(), vec![0.1, 0.2]))
            .unwrap()
    }

    #[test]
    fn test_one_dimensional_round_trip() {
        let schedule = Samplespace::new()
            .with_quantity(SettableQuantity::new("frequencies", "Hz").with_values(q00(), vec![1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let dataset = assemble(raw(vec![5.0, 6.0, 7.0, 8.0]), &program(), &node(schedule)).unwrap();

        let values = &dataset.get(&q00()).unwrap().values;
        assert_eq!(values.shape(), &[4]);
        assert_eq!(values.axes[0].name, "frequencies");
        assert_eq!(values.axes[0].coords, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values.value_at(&[3.0]), Some(c(7.0)));
    }

    #[test]
    fn test_first_declared_axis_varies_fastest() {
        let dataset = assemble(
            raw((0..6).map(f64::from).collect()),
            &program(),
            &node(two_axes()),
        )
        .unwrap();

        let values = &dataset.get(&q00()).unwrap().values;
        assert_eq!(values.shape(), &[3, 2]);
        assert_eq!(values.value_at(&[20.0, 0.1]), Some(c(1.0)));
        assert_eq!(values.value_at(&[10.0, 0.2]), Some(c(3.0)));
        assert_eq!(values.value_at(&[30.0, 0.2]), Some(c(5.0)));
    }

    #[test]
    fn test_shots_are_outermost() {
        let node = node(two_axes()).with_reshape(ReshapeHints {
            shots: Some(2),
            ..Default::default()
        });
        let dataset = assemble(raw((0..12).map(f64::from).collect()), &program(), &node).unwrap();

        let values = &dataset.get(&q00()).unwrap().values;
        assert_eq!(values.shape(), &[3, 2, 2]);
        assert_eq!(values.axes[2].name, SHOT_AXIS);
        assert_eq!(values.value_at(&[10.0, 0.1, 1.0]), Some(c(6.0)));
        assert_eq!(values.value_at(&[30.0, 0.2, 1.0]), Some(c(11.0)));
    }

    #[test]
    fn test_loop_repetitions_follow_first_axis() {
        let node = node(two_axes()).with_reshape(ReshapeHints {
            loop_repetitions: Some(2),
            ..Default::default()
        });
        // x fastest, then repetition, then y.
        let dataset = assemble(raw((0..12).map(f64::from).collect()), &program(), &node).unwrap();

        let values = &dataset.get(&q00()).unwrap().values;
        assert_eq!(values.shape(), &[3, 2, 2]);
        assert_eq!(values.axes[2].name, LOOP_AXIS);
        assert_eq!(values.value_at(&[20.0, 0.1, 1.0]), Some(c(4.0)));
        assert_eq!(values.value_at(&[10.0, 0.2, 0.0]), Some(c(6.0)));
    }

    #[test]
    fn test_calibration_points_split_off() {
        let schedule = Samplespace::new()
            .with_quantity(SettableQuantity::new("amp", "V").with_values(q00(), vec![0.0, 0.5, 1.0]))
            .unwrap();
        let node = node(schedule).with_reshape(ReshapeHints {
            calibration_points: 2,
            ..Default::default()
        });
        let dataset = assemble(raw(vec![1.0, 2.0, 3.0, -1.0, -2.0]), &program(), &node).unwrap();

        let data = dataset.get(&q00()).unwrap();
        assert_eq!(data.values.shape(), &[3]);
        let calibration = data.calibration.as_ref().unwrap();
        assert_eq!(calibration.axes[0].name, CALIBRATION_AXIS);
        assert_eq!(calibration.value_at(&[1.0]), Some(c(-2.0)));
    }

    #[test]
    fn test_external_slice_becomes_trailing_axis() {
        let mut node = node(two_axes());
        node.reduced_external = Samplespace::new()
            .with_quantity(SettableQuantity::new("dc_current", "A").with_values(q00(), vec![0.003]))
            .unwrap();
        let dataset = assemble(raw((0..6).map(f64::from).collect()), &program(), &node).unwrap();

        let values = &dataset.get(&q00()).unwrap().values;
        assert_eq!(values.shape(), &[3, 2, 1]);
        assert_eq!(values.axes[2].role, AxisRole::External);
        assert_eq!(values.value_at(&[30.0, 0.1, 0.003]), Some(c(2.0)));
    }

    #[test]
    fn test_shape_mismatch() {
        let result = assemble(raw(vec![1.0, 2.0, 3.0, 4.0, 5.0]), &program(), &node(two_axes()));
        assert!(matches!(
            result,
            Err(AssemblyError::ShapeMismatch {
                expected: 6,
                found: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_acquisition() {
        let result = assemble(RawResult::new(), &program(), &node(two_axes()));
        assert!(matches!(result, Err(AssemblyError::MissingAcquisition { index: 0, .. })));
    }

    #[test]
    fn test_conflicting_hints() {
        let node = node(two_axes()).with_reshape(ReshapeHints {
            shots: Some(2),
            loop_repetitions: Some(2),
            calibration_points: 0,
        });
        assert!(matches!(
            assemble(raw(vec![0.0; 24]), &program(), &node),
            Err(AssemblyError::ConflictingHints { .. })
        ));
    }
}
