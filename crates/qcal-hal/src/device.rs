//! Device representation handed to the experiment compiler.

use std::collections::BTreeMap;

use qcal_core::{PhysicalElement, Samplespace};
use serde::{Deserialize, Serialize};

/// Snapshot of the parameters the compiler sees for one compilation.
///
/// `None` marks a field that is missing or awaiting recalibration. Ordered
/// maps keep the snapshot, and therefore the compiled program, deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Element → field → value.
    pub elements: BTreeMap<PhysicalElement, BTreeMap<String, Option<f64>>>,
}

impl DeviceSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one field.
    pub fn insert(&mut self, element: PhysicalElement, field: impl Into<String>, value: Option<f64>) {
        self.elements
            .entry(element)
            .or_default()
            .insert(field.into(), value);
    }

    /// Read one field; `None` if absent or uncalibrated.
    pub fn get(&self, element: &PhysicalElement, field: &str) -> Option<f64> {
        self.elements.get(element)?.get(field).copied().flatten()
    }

    /// Whether the field is present in the snapshot, calibrated or not.
    pub fn contains(&self, element: &PhysicalElement, field: &str) -> bool {
        self.elements
            .get(element)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Elements in the snapshot.
    pub fn elements(&self) -> impl Iterator<Item = &PhysicalElement> {
        self.elements.keys()
    }

    /// Overlay the current external slice.
    ///
    /// Every quantity whose name is a field of the snapshot replaces that
    /// field's value for the elements it sweeps. The slice must be reduced
    /// (one value per element); only the first value of a sequence is used.
    pub fn apply_overrides(&mut self, slice: &Samplespace) -> usize {
        let mut applied = 0;
        for quantity in slice.quantities() {
            for (element, values) in &quantity.values {
                let Some(value) = values.first() else {
                    continue;
                };
                if let Some(fields) = self.elements.get_mut(element) {
                    if let Some(slot) = fields.get_mut(&quantity.name) {
                        *slot = Some(*value);
                        applied += 1;
                    }
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcal_core::SettableQuantity;

    #[test]
    fn test_apply_overrides() {
        let q00 = PhysicalElement::qubit("q00");
        let q01 = PhysicalElement::qubit("q01");
        let mut snapshot = DeviceSnapshot::new();
        snapshot.insert(q00.clone(), "measure:pulse_amp", Some(0.05));
        snapshot.insert(q01.clone(), "measure:pulse_amp", None);

        let slice = Samplespace::new()
            .with_quantity(
                SettableQuantity::new("measure:pulse_amp", "V")
                    .with_values(q00.clone(), vec![0.08])
                    .with_values(q01.clone(), vec![0.09]),
            )
            .unwrap()
            .with_quantity(SettableQuantity::new("unrelated", "").with_values(q00.clone(), vec![1.0]))
            .unwrap();

        assert_eq!(snapshot.apply_overrides(&slice), 2);
        assert_eq!(snapshot.get(&q00, "measure:pulse_amp"), Some(0.08));
        assert_eq!(snapshot.get(&q01, "measure:pulse_amp"), Some(0.09));
        assert!(!snapshot.contains(&q00, "unrelated"));
    }
}
