//! Physical elements of the processor: qubits and couplers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SamplespaceError, SamplespaceResult};

/// Separator between the two qubit ids of a coupler id (`q06_q07`).
pub const COUPLER_SEPARATOR: char = '_';

/// A qubit or a coupler on the processor.
///
/// Couplers are identified by the ids of the two qubits they connect, joined
/// with [`COUPLER_SEPARATOR`]. The qubits are parsed out of the identifier on
/// demand, so a coupler never stores a second copy of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PhysicalElement {
    /// A transmon qubit, e.g. `q06`.
    Qubit(String),
    /// A tunable coupler between two qubits, e.g. `q06_q07`.
    Coupler(String),
}

impl PhysicalElement {
    /// Create a qubit element.
    pub fn qubit(id: impl Into<String>) -> Self {
        Self::Qubit(id.into())
    }

    /// Create a coupler element, checking that the id names exactly two qubits.
    pub fn coupler(id: impl Into<String>) -> SamplespaceResult<Self> {
        let id = id.into();
        let valid = id.split_once(COUPLER_SEPARATOR).is_some_and(|(a, b)| {
            !a.is_empty() && !b.is_empty() && !b.contains(COUPLER_SEPARATOR)
        });
        if valid {
            Ok(Self::Coupler(id))
        } else {
            Err(SamplespaceError::InvalidElement(id))
        }
    }

    /// Parse an identifier; ids containing the coupler separator are couplers.
    pub fn parse(id: &str) -> SamplespaceResult<Self> {
        if id.is_empty() {
            return Err(SamplespaceError::InvalidElement(id.to_string()));
        }
        if id.contains(COUPLER_SEPARATOR) {
            Self::coupler(id)
        } else {
            Ok(Self::qubit(id))
        }
    }

    /// The raw identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::Qubit(id) | Self::Coupler(id) => id,
        }
    }

    /// Whether this is a qubit.
    pub fn is_qubit(&self) -> bool {
        matches!(self, Self::Qubit(_))
    }

    /// Whether this is a coupler.
    pub fn is_coupler(&self) -> bool {
        matches!(self, Self::Coupler(_))
    }

    /// The qubits this element consists of.
    ///
    /// A qubit returns itself, a coupler the two qubits it connects.
    pub fn qubits(&self) -> Vec<PhysicalElement> {
        match self {
            Self::Qubit(_) => vec![self.clone()],
            Self::Coupler(id) => id
                .split(COUPLER_SEPARATOR)
                .map(PhysicalElement::qubit)
                .collect(),
        }
    }

    /// Whether `other` is this element or one of its constituent qubits.
    pub fn covers(&self, other: &PhysicalElement) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Coupler(_), Self::Qubit(_)) => self.qubits().contains(other),
            _ => false,
        }
    }
}

impl fmt::Display for PhysicalElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PhysicalElement {
    type Err = SamplespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhysicalElement {
    type Error = SamplespaceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PhysicalElement> for String {
    fn from(element: PhysicalElement) -> Self {
        match element {
            PhysicalElement::Qubit(id) | PhysicalElement::Coupler(id) => id,
        }
    }
}
