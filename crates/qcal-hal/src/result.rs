//! Raw acquisition data returned by the hardware.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::ArrayD;
use num_complex::Complex64;

/// Acquisition index → complex buffer, as returned by the instrument.
///
/// Consumed once by dataset assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    acquisitions: BTreeMap<u32, ArrayD<Complex64>>,
}

impl RawResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the buffer for one acquisition index.
    #[must_use]
    pub fn with_acquisition(mut self, index: u32, data: ArrayD<Complex64>) -> Self {
        self.acquisitions.insert(index, data);
        self
    }

    /// Insert or replace the buffer for one acquisition index.
    pub fn insert(&mut self, index: u32, data: ArrayD<Complex64>) {
        self.acquisitions.insert(index, data);
    }

    /// Buffer for an acquisition index.
    pub fn get(&self, index: u32) -> Option<&ArrayD<Complex64>> {
        self.acquisitions.get(&index)
    }

    /// Take ownership of one buffer.
    pub fn take(&mut self, index: u32) -> Option<ArrayD<Complex64>> {
        self.acquisitions.remove(&index)
    }

    /// Indices present in the result.
    pub fn indices(&self) -> BTreeSet<u32> {
        self.acquisitions.keys().copied().collect()
    }

    /// Number of acquisitions.
    pub fn len(&self) -> usize {
        self.acquisitions.len()
    }

    /// Whether no acquisition was returned.
    pub fn is_empty(&self) -> bool {
        self.acquisitions.is_empty()
    }
}

impl FromIterator<(u32, ArrayD<Complex64>)> for RawResult {
    fn from_iter<T: IntoIterator<Item = (u32, ArrayD<Complex64>)>>(iter: T) -> Self {
        Self {
            acquisitions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_take_and_indices() {
        let buffer = ArrayD::from_elem(IxDyn(&[3]), Complex64::new(1.0, 0.0));
        let mut result: RawResult = [(0, buffer.clone()), (2, buffer)].into_iter().collect();

        assert_eq!(result.indices().into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert!(result.take(0).is_some());
        assert!(result.take(0).is_none());
        assert_eq!(result.len(), 1);
    }
}
