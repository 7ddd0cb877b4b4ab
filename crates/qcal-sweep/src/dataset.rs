//! Labeled complex arrays produced by dataset assembly.
//!
//! Every measured element gets one [`ElementDataset`]: the swept data with
//! one [`Axis`] per dimension, plus the calibration reference slots if the
//! node appends any. Datasets of successive external iterations are joined
//! with [`AssembledDataset::merge`].

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use qcal_core::PhysicalElement;
use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, AssemblyResult};

/// What an axis represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRole {
    /// Swept inside the compiled program.
    Schedule,
    /// Swept between executions.
    External,
    /// Repeated shots or loop repetitions.
    Repetition,
    /// Calibration reference slots.
    Calibration,
}

/// One labeled dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Axis name, the settable quantity name for swept axes.
    pub name: String,
    /// Unit of the coordinates.
    pub unit: String,
    /// Axis role.
    pub role: AxisRole,
    /// Samplespace key the coordinates were taken from.
    pub element: Option<PhysicalElement>,
    /// Coordinate of every index.
    pub coords: Vec<f64>,
}

impl Axis {
    /// Create an axis.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, role: AxisRole, coords: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            role,
            element: None,
            coords,
        }
    }

    /// Record the samplespace key of the coordinates.
    #[must_use]
    pub fn with_element(mut self, element: PhysicalElement) -> Self {
        self.element = Some(element);
        self
    }

    /// An index axis `0..len`.
    pub fn index(name: impl Into<String>, role: AxisRole, len: usize) -> Self {
        Self::new(name, "", role, (0..len).map(|i| i as f64).collect())
    }

    /// Number of coordinates.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether the axis has no coordinates.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Index of a coordinate.
    pub fn position(&self, coord: f64) -> Option<usize> {
        self.coords.iter().position(|c| *c == coord)
    }
}

/// A complex array with one [`Axis`] per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    /// Axes in array order.
    pub axes: Vec<Axis>,
    /// Data; `data.shape()[i] == axes[i].len()`.
    pub data: ArrayD<Complex64>,
}

impl LabeledArray {
    /// Pair data with its axes, checking the lengths agree.
    pub fn new(axes: Vec<Axis>, data: ArrayD<Complex64>) -> AssemblyResult<Self> {
        let expected: Vec<usize> = axes.iter().map(Axis::len).collect();
        if data.shape() != expected.as_slice() {
            return Err(AssemblyError::AxisLengths {
                axes: expected,
                data: data.shape().to_vec(),
            });
        }
        Ok(Self { axes, data })
    }

    /// Shape of the data.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Look up an axis by name.
    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name == name)
    }

    /// Value at the given coordinates, one per axis in array order.
    pub fn value_at(&self, coords: &[f64]) -> Option<Complex64> {
        if coords.len() != self.axes.len() {
            return None;
        }
        let index = self
            .axes
            .iter()
            .zip(coords)
            .map(|(axis, coord)| axis.position(*coord))
            .collect::<Option<Vec<_>>>()?;
        self.data.get(IxDyn(&index)).copied()
    }

    /// Outer join with `other` on coordinates.
    ///
    /// Both arrays must have the same axes by name and role. Coordinates keep
    /// the order of `self` with new coordinates of `other` appended. Where both
    /// hold a value, `other` wins; cells neither covers are NaN.
    pub fn outer_join(&self, other: &LabeledArray, element: &PhysicalElement) -> AssemblyResult<Self> {
        let mismatch = |reason: String| AssemblyError::MergeMismatch {
            element: element.to_string(),
            reason,
        };
        if self.axes.len() != other.axes.len() {
            return Err(mismatch(format!(
                "{} axes vs {} axes",
                self.axes.len(),
                other.axes.len()
            )));
        }

        let mut axes = Vec::with_capacity(self.axes.len());
        let mut other_maps = Vec::with_capacity(self.axes.len());
        for (mine, theirs) in self.axes.iter().zip(&other.axes) {
            if mine.name != theirs.name || mine.role != theirs.role {
                return Err(mismatch(format!(
                    "axis '{}' does not line up with '{}'",
                    mine.name, theirs.name
                )));
            }
            let mut merged = mine.clone();
            let map: Vec<usize> = theirs
                .coords
                .iter()
                .map(|coord| match merged.position(*coord) {
                    Some(i) => i,
                    None => {
                        merged.coords.push(*coord);
                        merged.coords.len() - 1
                    }
                })
                .collect();
            axes.push(merged);
            other_maps.push(map);
        }

        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        let mut data = ArrayD::from_elem(IxDyn(&shape), Complex64::new(f64::NAN, f64::NAN));
        for (index, value) in self.data.indexed_iter() {
            data[index] = *value;
        }
        let mut target = vec![0; shape.len()];
        for (index, value) in other.data.indexed_iter() {
            for (axis, slot) in target.iter_mut().enumerate() {
                *slot = other_maps[axis][index[axis]];
            }
            data[IxDyn(&target)] = *value;
        }

        Ok(Self { axes, data })
    }
}

/// Data measured on one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDataset {
    /// Element the data was measured on.
    pub element: PhysicalElement,
    /// Acquisition index the data came from.
    pub acquisition: u32,
    /// Swept data.
    pub values: LabeledArray,
    /// Calibration reference slots, leading axis [`AxisRole::Calibration`]
    /// followed by the external axes.
    pub calibration: Option<LabeledArray>,
}

/// One node's measurement, per element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledDataset {
    /// Node that produced the data.
    pub node: String,
    /// Per-element data.
    pub elements: BTreeMap<PhysicalElement, ElementDataset>,
}

impl AssembledDataset {
    /// Create an empty dataset.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            elements: BTreeMap::new(),
        }
    }

    /// Add one element's data.
    pub fn insert(&mut self, data: ElementDataset) {
        self.elements.insert(data.element.clone(), data);
    }

    /// Data of one element.
    pub fn get(&self, element: &PhysicalElement) -> Option<&ElementDataset> {
        self.elements.get(element)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element has data.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Join another iteration's data into this one.
    ///
    /// Either every element is joined or, on error, `self` is unchanged.
    pub fn merge(&mut self, other: AssembledDataset) -> AssemblyResult<()> {
        let mut joined = Vec::with_capacity(other.elements.len());
        for (element, incoming) in other.elements {
            let merged = match self.elements.get(&element) {
                None => incoming,
                Some(existing) => {
                    let values = existing.values.outer_join(&incoming.values, &element)?;
                    let calibration = match (&existing.calibration, &incoming.calibration) {
                        (Some(a), Some(b)) => Some(a.outer_join(b, &element)?),
                        (None, None) => None,
                        _ => {
                            return Err(AssemblyError::MergeMismatch {
                                element: element.to_string(),
                                reason: "calibration points present in only one dataset".into(),
                            });
                        }
                    };
                    ElementDataset {
                        element: element.clone(),
                        acquisition: existing.acquisition,
                        values,
                        calibration,
                    }
                }
            };
            joined.push((element, merged));
        }
        self.elements.extend(joined);
        Ok(())
    }
}
