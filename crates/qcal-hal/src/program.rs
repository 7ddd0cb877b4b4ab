//! Experiments, compile requests and compiled programs.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use qcal_core::{PhysicalElement, Samplespace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceSnapshot;

/// Node-specific experiment description produced by a node's builder hook.
///
/// The `body` is opaque to the orchestrator; only the compiler interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment name, usually the node name.
    pub name: String,
    /// Elements with a readout in this experiment, one acquisition each.
    pub measured: Vec<PhysicalElement>,
    /// Compiler-specific description of the schedule.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Experiment {
    /// Create an experiment measuring the given elements.
    pub fn new(name: impl Into<String>, measured: Vec<PhysicalElement>) -> Self {
        Self {
            name: name.into(),
            measured,
            body: serde_json::Value::Null,
        }
    }

    /// Attach a compiler-specific body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }
}

/// Everything the compiler needs for one compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Name of the node being compiled.
    pub node: &'a str,
    /// Device parameters, external slice already applied.
    pub device: &'a DeviceSnapshot,
    /// Values swept inside the program.
    pub schedule: &'a Samplespace,
    /// The current single-value external slice.
    pub external: &'a Samplespace,
    /// The node's experiment description.
    pub experiment: &'a Experiment,
}

/// Unique identifier for a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub Uuid);

impl ProgramId {
    /// Create a new random program ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProgramId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A readout channel the program will fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionChannel {
    /// Acquisition index under which the hardware returns the data.
    pub index: u32,
    /// Element measured on this channel.
    pub element: PhysicalElement,
}

/// Executable program returned by the compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Program identifier.
    pub id: ProgramId,
    /// Node that produced the program.
    pub node: String,
    /// Declared acquisition channels.
    pub acquisitions: Vec<AcquisitionChannel>,
    /// Expected wall-clock time on hardware.
    pub estimated_duration: Duration,
    /// Instrument-specific program content.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CompiledProgram {
    /// Create a program with a fresh id.
    pub fn new(
        node: impl Into<String>,
        acquisitions: Vec<AcquisitionChannel>,
        estimated_duration: Duration,
    ) -> Self {
        Self {
            id: ProgramId::new(),
            node: node.into(),
            acquisitions,
            estimated_duration,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach an instrument-specific payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set of declared acquisition indices.
    pub fn acquisition_indices(&self) -> BTreeSet<u32> {
        self.acquisitions.iter().map(|a| a.index).collect()
    }

    /// Channel for an acquisition index.
    pub fn channel(&self, index: u32) -> Option<&AcquisitionChannel> {
        self.acquisitions.iter().find(|a| a.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_indices() {
        let program = CompiledProgram::new(
            "resonator_spectroscopy",
            vec![
                AcquisitionChannel {
                    index: 1,
                    element: PhysicalElement::qubit("q01"),
                },
                AcquisitionChannel {
                    index: 0,
                    element: PhysicalElement::qubit("q00"),
                },
            ],
            Duration::from_millis(10),
        );
        assert_eq!(
            program.acquisition_indices().into_iter().collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(
            program.channel(1).map(|c| c.element.id()),
            Some("q01")
        );
        assert!(program.channel(2).is_none());
    }
}
