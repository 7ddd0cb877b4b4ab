//! Record addressing and the values with special meaning in the store.

use std::fmt;
use std::str::FromStr;

use qcal_core::PhysicalElement;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Namespace of qubit parameter records.
pub const QUBIT_NAMESPACE: &str = "transmons";

/// Namespace of coupler parameter records.
pub const COUPLER_NAMESPACE: &str = "couplers";

/// Namespace of calibration status records.
pub const STATUS_NAMESPACE: &str = "cs";

/// Value written in place of a parameter that awaits recalibration.
pub const UNCALIBRATED: &str = "nan";

/// Suffix of the shadow field that keeps a value during recalibration.
pub const BACKUP_SUFFIX: &str = "_backup";

/// Key of the parameter record for `element`, e.g. `transmons:q06`.
pub fn record_key(element: &PhysicalElement) -> String {
    let namespace = match element {
        PhysicalElement::Qubit(_) => QUBIT_NAMESPACE,
        PhysicalElement::Coupler(_) => COUPLER_NAMESPACE,
    };
    format!("{namespace}:{}", element.id())
}

/// Key of the status record for `element`, e.g. `cs:q06`.
pub fn status_key(element: &PhysicalElement) -> String {
    format!("{STATUS_NAMESPACE}:{}", element.id())
}

/// Name of the shadow field for `field`, e.g. `clock_freqs:f01_backup`.
pub fn backup_field(field: &str) -> String {
    format!("{field}{BACKUP_SUFFIX}")
}

/// Calibration status of one node on one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node has not produced a value for this element yet.
    NotCalibrated,
    /// The node finished successfully for this element.
    Calibrated,
}

impl NodeStatus {
    /// The literal stored in the status record.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::NotCalibrated => "not_calibrated",
            NodeStatus::Calibrated => "calibrated",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_calibrated" => Ok(NodeStatus::NotCalibrated),
            "calibrated" => Ok(NodeStatus::Calibrated),
            other => Err(StoreError::InvalidValue {
                key: STATUS_NAMESPACE.to_string(),
                field: String::new(),
                value: other.to_string(),
            }),
        }
    }
}
