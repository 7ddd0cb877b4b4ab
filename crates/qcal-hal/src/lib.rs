//! qcal Hardware Abstraction Layer
//!
//! Narrow interfaces to the two collaborators the calibration chain drives but
//! does not implement: the experiment compiler and the instrument coordinator.
//!
//! # Overview
//!
//! - [`ExperimentCompiler`] turns a [`CompileRequest`] into a [`CompiledProgram`]
//! - [`HardwareDriver`] runs a program and returns a [`RawResult`]
//! - [`DeviceSnapshot`] is the parameter view handed to the compiler
//!
//! # Implementing a Custom Driver
//!
//! ```ignore
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use qcal_hal::{CompiledProgram, HalResult, HardwareDriver, RawResult};
//!
//! struct MyDriver;
//!
//! #[async_trait]
//! impl HardwareDriver for MyDriver {
//!     fn name(&self) -> &str { "my_driver" }
//!     async fn prepare(&mut self, program: &CompiledProgram) -> HalResult<()> { todo!() }
//!     async fn start(&mut self) -> HalResult<()> { todo!() }
//!     async fn wait_done(&mut self, timeout: Duration) -> HalResult<()> { todo!() }
//!     async fn retrieve_acquisition(&mut self) -> HalResult<RawResult> { todo!() }
//!     async fn stop(&mut self) -> HalResult<()> { todo!() }
//! }
//! ```

pub mod device;
pub mod driver;
pub mod error;
pub mod program;
pub mod result;

pub use device::DeviceSnapshot;
pub use driver::{ExperimentCompiler, HardwareDriver};
pub use error::{HalError, HalResult};
pub use program::{AcquisitionChannel, CompileRequest, CompiledProgram, Experiment, ProgramId};
pub use result::RawResult;
