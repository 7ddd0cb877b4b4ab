//! Simulated instrument coordinator.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ndarray::Array1;
use num_complex::Complex64;
use qcal_hal::{CompiledProgram, HalError, HalResult, HardwareDriver, RawResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

use crate::compiler::SimProgram;

/// A program loaded onto the simulated instruments.
struct LoadedProgram {
    program: SimProgram,
    duration: Duration,
}

/// Hardware driver that replays the signal of a simulated program with
/// uniform noise added.
///
/// Waiting takes the program's estimated duration scaled by `time_scale`.
/// Faults can be injected for testing: a hanging instrument and dropped
/// acquisitions.
pub struct SimulatedDriver {
    noise: f64,
    time_scale: f64,
    rng: StdRng,
    hang: bool,
    dropped: BTreeSet<u32>,
    loaded: Option<LoadedProgram>,
    running: bool,
    runs: Arc<AtomicUsize>,
}

impl SimulatedDriver {
    /// Create a noiseless driver that runs in real time.
    pub fn new() -> Self {
        Self {
            noise: 0.0,
            time_scale: 1.0,
            rng: StdRng::from_entropy(),
            hang: false,
            dropped: BTreeSet::new(),
            loaded: None,
            running: false,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use a fixed seed for the noise.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Add uniform noise in `[-noise, noise)` to both quadratures.
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Scale the simulated run time; `0.0` returns immediately.
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    /// Never report completion.
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Omit an acquisition index from every result.
    #[must_use]
    pub fn dropping_acquisition(mut self, index: u32) -> Self {
        self.dropped.insert(index);
        self
    }

    /// Counter of completed runs, shared with the caller.
    pub fn run_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }

    fn loaded(&self) -> HalResult<&LoadedProgram> {
        self.loaded
            .as_ref()
            .ok_or_else(|| HalError::NotPrepared("no program loaded".into()))
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    #[instrument(skip_all, fields(program = %program.id))]
    async fn prepare(&mut self, program: &CompiledProgram) -> HalResult<()> {
        let sim: SimProgram = serde_json::from_value(program.payload.clone())?;
        let duration = program.estimated_duration.mul_f64(self.time_scale);
        debug!("Loaded {} acquisitions ({:?})", sim.acquisitions.len(), duration);
        self.loaded = Some(LoadedProgram {
            program: sim,
            duration,
        });
        self.running = false;
        Ok(())
    }

    async fn start(&mut self) -> HalResult<()> {
        self.loaded()?;
        self.running = true;
        Ok(())
    }

    async fn wait_done(&mut self, timeout: Duration) -> HalResult<()> {
        if !self.running {
            return Err(HalError::NotPrepared("program not started".into()));
        }
        let duration = self.loaded()?.duration;
        if self.hang || duration > timeout {
            tokio::time::sleep(timeout).await;
            return Err(HalError::Timeout(timeout));
        }
        tokio::time::sleep(duration).await;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn retrieve_acquisition(&mut self) -> HalResult<RawResult> {
        let noise = self.noise;
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| HalError::NotPrepared("no program loaded".into()))?;
        let mut raw = RawResult::new();
        for acquisition in &loaded.program.acquisitions {
            if self.dropped.contains(&acquisition.index) {
                continue;
            }
            let rng = &mut self.rng;
            let buffer: Array1<Complex64> = acquisition
                .signal
                .iter()
                .map(|&s| {
                    if noise > 0.0 {
                        Complex64::new(
                            s + rng.gen_range(-noise..noise),
                            rng.gen_range(-noise..noise),
                        )
                    } else {
                        Complex64::new(s, 0.0)
                    }
                })
                .collect();
            raw.insert(acquisition.index, buffer.into_dyn());
        }
        Ok(raw)
    }

    async fn stop(&mut self) -> HalResult<()> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SimAcquisition;
    use qcal_core::PhysicalElement;
    use qcal_hal::AcquisitionChannel;

    fn program() -> CompiledProgram {
        let sim = SimProgram {
            acquisitions: vec![
                SimAcquisition {
                    index: 0,
                    signal: vec![1.0, 0.5],
                },
                SimAcquisition {
                    index: 1,
                    signal: vec![0.0, 0.25],
                },
            ],
        };
        CompiledProgram::new(
            "test",
            vec![
                AcquisitionChannel {
                    index: 0,
                    element: PhysicalElement::qubit("q00"),
                },
                AcquisitionChannel {
                    index: 1,
                    element: PhysicalElement::qubit("q01"),
                },
            ],
            Duration::from_millis(50),
        )
        .with_payload(serde_json::to_value(sim).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_signal() {
        let mut driver = SimulatedDriver::new();
        let runs = driver.run_counter();

        driver.prepare(&program()).await.unwrap();
        driver.start().await.unwrap();
        driver.wait_done(Duration::from_secs(1)).await.unwrap();
        let raw = driver.retrieve_acquisition().await.unwrap();
        driver.stop().await.unwrap();

        assert_eq!(raw.len(), 2);
        assert_eq!(raw.get(1).unwrap()[[1]], Complex64::new(0.25, 0.0));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_driver_times_out() {
        let mut driver = SimulatedDriver::new().hanging();
        driver.prepare(&program()).await.unwrap();
        driver.start().await.unwrap();
        assert!(matches!(
            driver.wait_done(Duration::from_millis(10)).await,
            Err(HalError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        let mut driver = SimulatedDriver::new();
        assert!(matches!(
            driver.wait_done(Duration::from_millis(10)).await,
            Err(HalError::NotPrepared(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_acquisition_and_noise() {
        let mut driver = SimulatedDriver::new()
            .with_seed(7)
            .with_noise(0.01)
            .dropping_acquisition(1);
        driver.prepare(&program()).await.unwrap();
        driver.start().await.unwrap();
        driver.wait_done(Duration::from_secs(1)).await.unwrap();
        let raw = driver.retrieve_acquisition().await.unwrap();

        assert_eq!(raw.indices().into_iter().collect::<Vec<_>>(), vec![0]);
        let value = raw.get(0).unwrap()[[0]];
        assert!((value.re - 1.0).abs() < 0.01);
        assert!(value.im.abs() < 0.01);
    }
}
