//! Hardware driver and experiment compiler interfaces.
//!
//! # Execution lifecycle
//!
//! ```text
//!   prepare(program) ──→ start() ──→ wait_done(timeout) ──→ retrieve_acquisition() ──→ stop()
//! ```
//!
//! | Method | Kind | Returns |
//! |--------|------|---------|
//! | `name()` | sync | `&str` |
//! | `prepare()` | async | `HalResult<()>` |
//! | `start()` | async | `HalResult<()>` |
//! | `wait_done()` | async | `HalResult<()>` |
//! | `retrieve_acquisition()` | async | `HalResult<RawResult>` |
//! | `stop()` | async | `HalResult<()>` |
//!
//! A driver is owned by a single execution at a time: every call takes
//! `&mut self`, so concurrent use of the instrument cannot be expressed.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HalResult;
use crate::program::{CompileRequest, CompiledProgram};
use crate::result::RawResult;

/// Driver for the instrument coordinator.
#[async_trait]
pub trait HardwareDriver: Send {
    /// Name of this driver.
    fn name(&self) -> &str;

    /// Load a compiled program onto the instruments.
    async fn prepare(&mut self, program: &CompiledProgram) -> HalResult<()>;

    /// Start the prepared program.
    async fn start(&mut self) -> HalResult<()>;

    /// Wait until the program has finished.
    ///
    /// Implementations should return [`HalError::Timeout`](crate::HalError::Timeout)
    /// when `timeout` elapses; callers additionally bound the call themselves.
    async fn wait_done(&mut self, timeout: Duration) -> HalResult<()>;

    /// Fetch the acquired data of the last run.
    async fn retrieve_acquisition(&mut self) -> HalResult<RawResult>;

    /// Stop all instruments.
    async fn stop(&mut self) -> HalResult<()>;
}

/// Translates an experiment description into an executable program.
///
/// Compilation must be deterministic: the same request produces an
/// equivalent program.
pub trait ExperimentCompiler: Send + Sync {
    /// Name of this compiler.
    fn name(&self) -> &str;

    /// Compile one experiment.
    fn compile(&self, request: &CompileRequest<'_>) -> HalResult<CompiledProgram>;
}
