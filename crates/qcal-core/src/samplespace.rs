//! Declarative sweep description.
//!
//! A [`Samplespace`] maps each *settable quantity* (a swept parameter such as
//! `readout_frequencies` or `mw_amplitudes`) to the values swept on every
//! element. Quantities keep their declaration order: dataset assembly uses it
//! as the axis order, so it is stored as a `Vec` and never derived from map
//! iteration.
//!
//! ```text
//!   Samplespace
//!     ├── "frequencies"  { q00: [f0, f1, ..., fn], q01: [...] }
//!     └── "amplitudes"   { q00: [a0, a1, ..., am], q01: [...] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::PhysicalElement;
use crate::error::{SamplespaceError, SamplespaceResult};

/// `num` evenly spaced values over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// One swept parameter and its per-element value sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettableQuantity {
    /// Quantity name, also used as axis name and device field override.
    pub name: String,
    /// Physical unit of the values (`Hz`, `V`, `s`, ...).
    #[serde(default)]
    pub unit: String,
    /// Values swept on each element, in sweep order.
    pub values: BTreeMap<PhysicalElement, Vec<f64>>,
}

impl SettableQuantity {
    /// Create an empty quantity.
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add the sweep values for one element.
    #[must_use]
    pub fn with_values(mut self, element: PhysicalElement, values: Vec<f64>) -> Self {
        self.values.insert(element, values);
        self
    }

    /// Values swept on `element`, if it is a key of this quantity.
    pub fn values_for(&self, element: &PhysicalElement) -> Option<&[f64]> {
        self.values.get(element).map(Vec::as_slice)
    }

    /// The key of this quantity that covers `element`: the element itself, or
    /// a coupler containing it.
    pub fn key_covering(&self, element: &PhysicalElement) -> Option<&PhysicalElement> {
        if self.values.contains_key(element) {
            return self.values.get_key_value(element).map(|(k, _)| k);
        }
        self.values.keys().find(|key| key.covers(element))
    }

    /// Number of values swept per element.
    ///
    /// Every element must sweep the same number of values; the first element
    /// (in key order) sets the expected length.
    pub fn dimension(&self) -> SamplespaceResult<usize> {
        let mut iter = self.values.iter();
        let Some((_, first)) = iter.next() else {
            return Ok(0);
        };
        let expected = first.len();
        for (element, values) in iter {
            if values.len() != expected {
                return Err(SamplespaceError::LengthMismatch {
                    quantity: self.name.clone(),
                    element: element.to_string(),
                    expected,
                    found: values.len(),
                });
            }
        }
        Ok(expected)
    }
}

/// Ordered collection of settable quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Samplespace {
    quantities: Vec<SettableQuantity>,
}

impl Samplespace {
    /// Create an empty samplespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a quantity, rejecting duplicate names.
    pub fn push(&mut self, quantity: SettableQuantity) -> SamplespaceResult<()> {
        if self.quantity(&quantity.name).is_some() {
            return Err(SamplespaceError::DuplicateQuantity(quantity.name));
        }
        self.quantities.push(quantity);
        Ok(())
    }

    /// Builder form of [`Samplespace::push`].
    pub fn with_quantity(mut self, quantity: SettableQuantity) -> SamplespaceResult<Self> {
        self.push(quantity)?;
        Ok(self)
    }

    /// Quantities in declaration order.
    pub fn quantities(&self) -> &[SettableQuantity] {
        &self.quantities
    }

    /// Look up a quantity by name.
    pub fn quantity(&self, name: &str) -> Option<&SettableQuantity> {
        self.quantities.iter().find(|q| q.name == name)
    }

    /// Whether nothing is swept.
    pub fn is_empty(&self) -> bool {
        self.quantities.iter().all(|q| q.values.is_empty())
    }

    /// Check the per-quantity length invariant.
    pub fn validate(&self) -> SamplespaceResult<()> {
        for quantity in &self.quantities {
            quantity.dimension()?;
        }
        Ok(())
    }

    /// Number of iterations when every quantity is stepped in lockstep.
    ///
    /// All quantities must have the same dimension. An empty samplespace has
    /// dimension 0.
    pub fn sweep_dimension(&self) -> SamplespaceResult<usize> {
        let mut dims = self
            .quantities
            .iter()
            .filter(|q| !q.values.is_empty())
            .map(|q| q.dimension().map(|d| (q, d)));
        let Some(first) = dims.next() else {
            return Ok(0);
        };
        let (first, first_len) = first?;
        for next in dims {
            let (other, other_len) = next?;
            if other_len != first_len {
                return Err(SamplespaceError::DimensionMismatch {
                    first: first.name.clone(),
                    first_len,
                    other: other.name.clone(),
                    other_len,
                });
            }
        }
        Ok(first_len)
    }

    /// The single-value slice at `index` of every sequence.
    ///
    /// The result always has sweep dimension 1 (or 0 if nothing is swept).
    pub fn slice(&self, index: usize) -> SamplespaceResult<Samplespace> {
        let dimension = self.sweep_dimension()?;
        if index >= dimension {
            return Err(SamplespaceError::IndexOutOfRange { index, dimension });
        }
        let quantities = self
            .quantities
            .iter()
            .map(|q| SettableQuantity {
                name: q.name.clone(),
                unit: q.unit.clone(),
                values: q
                    .values
                    .iter()
                    .map(|(element, values)| (element.clone(), vec![values[index]]))
                    .collect(),
            })
            .collect();
        Ok(Samplespace { quantities })
    }

    /// Whether every sequence holds exactly one value.
    pub fn is_reduced(&self) -> bool {
        self.quantities
            .iter()
            .flat_map(|q| q.values.values())
            .all(|values| values.len() == 1)
    }

    /// Quantities relevant to `element` in declaration order, paired with the
    /// values swept on the key that covers it.
    pub fn for_element<'a>(
        &'a self,
        element: &PhysicalElement,
    ) -> Vec<(&'a SettableQuantity, &'a [f64])> {
        self.quantities
            .iter()
            .filter_map(|q| {
                let key = q.key_covering(element)?;
                q.values_for(key).map(|values| (q, values))
            })
            .collect()
    }

    /// Fail unless every element has at least one quantity swept on it.
    /// An empty samplespace covers nothing and is accepted.
    pub fn check_coverage(&self, elements: &[PhysicalElement]) -> SamplespaceResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        match elements.iter().find(|e| self.for_element(e).is_empty()) {
            Some(element) => Err(SamplespaceError::UncoveredElement(element.to_string())),
            None => Ok(()),
        }
    }

    /// Every element that appears as a key.
    pub fn elements(&self) -> Vec<PhysicalElement> {
        let mut elements: Vec<PhysicalElement> = self
            .quantities
            .iter()
            .flat_map(|q| q.values.keys().cloned())
            .collect();
        elements.sort();
        elements.dedup();
        elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(id: &str) -> PhysicalElement {
        PhysicalElement::qubit(id)
    }

    fn external() -> Samplespace {
        Samplespace::new()
            .with_quantity(
                SettableQuantity::new("ro_amplitudes", "V")
                    .with_values(q("q00"), vec![0.1, 0.2, 0.3])
                    .with_values(q("q01"), vec![0.4, 0.5, 0.6]),
            )
            .unwrap()
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_slice_is_reduced() {
        let space = external();
        assert_eq!(space.sweep_dimension().unwrap(), 3);

        let slice = space.slice(1).unwrap();
        assert!(slice.is_reduced());
        assert_eq!(slice.sweep_dimension().unwrap(), 1);
        let quantity = slice.quantity("ro_amplitudes").unwrap();
        assert_eq!(quantity.values_for(&q("q00")), Some(&[0.2][..]));
        assert_eq!(quantity.values_for(&q("q01")), Some(&[0.5][..]));
    }

    #[test]
    fn test_slice_out_of_range() {
        let err = external().slice(3).unwrap_err();
        assert_eq!(
            err,
            SamplespaceError::IndexOutOfRange {
                index: 3,
                dimension: 3
            }
        );
    }

    #[test]
    fn test_mismatched_lengths_fail_fast() {
        let space = Samplespace::new()
            .with_quantity(
                SettableQuantity::new("frequencies", "Hz")
                    .with_values(q("q00"), vec![1.0, 2.0, 3.0])
                    .with_values(q("q01"), vec![1.0, 2.0]),
            )
            .unwrap();
        assert!(matches!(
            space.validate(),
            Err(SamplespaceError::LengthMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
        assert!(space.sweep_dimension().is_err());
    }

    #[test]
    fn test_lockstep_dimension_mismatch() {
        let space = external()
            .with_quantity(
                SettableQuantity::new("frequencies", "Hz").with_values(q("q00"), vec![1.0, 2.0]),
            )
            .unwrap();
        assert!(matches!(
            space.sweep_dimension(),
            Err(SamplespaceError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_quantity() {
        let err = external()
            .with_quantity(SettableQuantity::new("ro_amplitudes", "V"))
            .unwrap_err();
        assert_eq!(
            err,
            SamplespaceError::DuplicateQuantity("ro_amplitudes".into())
        );
    }

    #[test]
    fn test_for_element_matches_couplers() {
        let coupler = PhysicalElement::coupler("q00_q01").unwrap();
        let space = Samplespace::new()
            .with_quantity(
                SettableQuantity::new("dc_currents", "A").with_values(coupler, vec![1e-3, 2e-3]),
            )
            .unwrap()
            .with_quantity(
                SettableQuantity::new("frequencies", "Hz").with_values(q("q00"), vec![4e9]),
            )
            .unwrap();

        let names: Vec<_> = space
            .for_element(&q("q00"))
            .into_iter()
            .map(|(quantity, _)| quantity.name.as_str())
            .collect();
        assert_eq!(names, vec!["dc_currents", "frequencies"]);

        let names: Vec<_> = space
            .for_element(&q("q01"))
            .into_iter()
            .map(|(quantity, _)| quantity.name.as_str())
            .collect();
        assert_eq!(names, vec!["dc_currents"]);
    }

    #[test]
    fn test_coverage_of_measured_elements() {
        let coupler = PhysicalElement::coupler("q00_q01").unwrap();
        let flux = Samplespace::new()
            .with_quantity(SettableQuantity::new("flux", "V").with_values(q("q00"), vec![0.1, 0.2]))
            .unwrap();
        assert!(flux.check_coverage(&[q("q00")]).is_ok());
        assert_eq!(
            flux.check_coverage(&[q("q00"), q("q01")]),
            Err(SamplespaceError::UncoveredElement("q01".into()))
        );

        let currents = Samplespace::new()
            .with_quantity(SettableQuantity::new("dc_currents", "A").with_values(coupler, vec![1e-3]))
            .unwrap();
        assert!(currents.check_coverage(&[q("q00"), q("q01")]).is_ok());
        assert!(Samplespace::new().check_coverage(&[q("q00")]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_dimension_rejects_unequal_lengths(a in 1usize..20, b in 1usize..20) {
            let space = Samplespace::new()
                .with_quantity(
                    SettableQuantity::new("x", "")
                        .with_values(q("q00"), vec![0.0; a])
                        .with_values(q("q01"), vec![0.0; b]),
                )
                .unwrap();
            prop_assert_eq!(space.validate().is_ok(), a == b);
            if a == b {
                prop_assert_eq!(space.sweep_dimension().unwrap(), a);
            }
        }
    }
}
