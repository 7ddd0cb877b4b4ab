//! qcal sweep orchestration
//!
//! Runs a calibration node: backs up the parameters it is about to
//! recalibrate, compiles its experiment, executes it on the hardware, shapes
//! the raw acquisitions into labeled arrays and hands the merged result to
//! the node's analysis.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SweepOrchestrator                        │
//! │   for each external slice (or once):                         │
//! │                                                              │
//! │   CompilationStage ──→ execute() ──→ assemble() ──→ merge    │
//! │   backup, snapshot,     hardware ‖     reshape,              │
//! │   prerequisites         progress       label axes            │
//! │                                                              │
//! │   analyze(merged) ──→ status flags                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Sweep types
//!
//! | Sweep | External samplespace | Compilations | Measurements |
//! |-------|----------------------|--------------|--------------|
//! | simple | empty | 1 | 1 |
//! | simple | `k` values | 1 | `k` |
//! | parameterized | `k` values | `k` | `k` |
//!
//! Every iteration is written to the node's run directory; see [`persist`].

pub mod assemble;
pub mod compile;
pub mod dataset;
pub mod error;
pub mod execute;
pub mod node;
pub mod orchestrator;
pub mod persist;

pub use assemble::assemble;
pub use compile::CompilationStage;
pub use dataset::{AssembledDataset, Axis, AxisRole, ElementDataset, LabeledArray};
pub use error::{
    AssemblyError, AssemblyResult, NodeFailed, PersistError, PersistResult, SweepError,
    SweepResult,
};
pub use execute::{ExecutionConfig, execute};
pub use node::{NodeDescriptor, NodeHooks, NodeKind, ReshapeHints, SweepType};
pub use orchestrator::{NodeOutcome, OrchestratorState, SweepOrchestrator};
pub use persist::{DATASET_EXTENSION, RunDirectory, load_dataset};
