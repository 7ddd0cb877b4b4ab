//! qcal simulated hardware
//!
//! A stand-in for the pulse compiler and the instrument coordinator, used by
//! the CLI and the integration tests.
//!
//! - [`SimulatedCompiler`] evaluates a [`SignalModel`] over the schedule
//!   samplespace and packs the noiseless signal into the program payload.
//! - [`SimulatedDriver`] replays that signal with optional noise, takes the
//!   program's estimated duration to finish, and can inject faults.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qcal_adapter_sim::{SimulatedCompiler, SimulatedDriver};
//! use qcal_store::ParameterStore;
//! use qcal_sweep::SweepOrchestrator;
//!
//! let orchestrator = SweepOrchestrator::new(
//!     ParameterStore::in_memory(),
//!     Arc::new(SimulatedCompiler::new()),
//!     Box::new(SimulatedDriver::new().with_noise(0.01)),
//!     "/tmp/qcal",
//! );
//! ```

pub mod compiler;
pub mod driver;

pub use compiler::{SignalModel, SimAcquisition, SimExperiment, SimProgram, SimulatedCompiler};
pub use driver::SimulatedDriver;
