//! Error types for the core model.

use thiserror::Error;

/// Errors raised while building or slicing a samplespace.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum SamplespaceError {
    /// Two elements of the same settable quantity sweep a different number of values.
    #[error(
        "Settable quantity '{quantity}': element {element} has {found} values, expected {expected}"
    )]
    LengthMismatch {
        /// Name of the settable quantity.
        quantity: String,
        /// The element whose sequence disagrees.
        element: String,
        /// Length of the first element's sequence.
        expected: usize,
        /// Length of the offending sequence.
        found: usize,
    },

    /// Two external quantities cannot be iterated in lockstep.
    #[error(
        "Settable quantities '{first}' ({first_len} values) and '{other}' ({other_len} values) differ in dimension"
    )]
    DimensionMismatch {
        /// First quantity in declaration order.
        first: String,
        /// Its dimension.
        first_len: usize,
        /// The quantity that disagrees.
        other: String,
        /// Its dimension.
        other_len: usize,
    },

    /// Slice index is past the end of the sweep.
    #[error("Sweep index {index} out of range for dimension {dimension}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Sweep dimension.
        dimension: usize,
    },

    /// An element is measured in every external iteration but no external
    /// quantity is swept on it, so its iterations cannot be told apart.
    #[error("No external quantity covers measured element {0}")]
    UncoveredElement(String),

    /// A settable quantity was declared twice.
    #[error("Settable quantity '{0}' declared twice")]
    DuplicateQuantity(String),

    /// An element identifier could not be parsed.
    #[error("Invalid element identifier: '{0}'")]
    InvalidElement(String),
}

/// Result type for samplespace operations.
pub type SamplespaceResult<T> = Result<T, SamplespaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SamplespaceError::LengthMismatch {
            quantity: "frequencies".into(),
            element: "q01".into(),
            expected: 5,
            found: 4,
        };
        assert_eq!(
            err.to_string(),
            "Settable quantity 'frequencies': element q01 has 4 values, expected 5"
        );

        let err = SamplespaceError::IndexOutOfRange {
            index: 3,
            dimension: 3,
        };
        assert_eq!(err.to_string(), "Sweep index 3 out of range for dimension 3");
    }
}
