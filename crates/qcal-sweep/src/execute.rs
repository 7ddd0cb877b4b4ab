//! Execution stage: drive the hardware while reporting progress.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use qcal_hal::{CompiledProgram, HalError, HardwareDriver, RawResult};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::error::{SweepError, SweepResult};

const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on waiting for the hardware to finish.
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Draw a progress bar on the terminal.
    pub progress: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            progress: false,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Run one program on the hardware.
///
/// The hardware sequence and the progress bar run concurrently on the
/// current task; the bar stops as soon as the hardware call returns. A
/// timeout stops the instruments and is not retried.
#[instrument(skip_all, fields(program = %program.id))]
pub async fn execute(
    program: &CompiledProgram,
    driver: &mut dyn HardwareDriver,
    config: &ExecutionConfig,
) -> SweepResult<RawResult> {
    let estimate = program.estimated_duration;
    info!(
        "Executing {} on {} (est. {:?}, timeout {:?})",
        program.node,
        driver.name(),
        estimate,
        config.timeout
    );

    let bar = progress_bar(estimate, config.progress);
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let started = Instant::now();

    let hardware = async move {
        let _done = done_tx;
        run_hardware(program, driver, config.timeout).await
    };
    let (raw, ()) = tokio::join!(hardware, track_progress(&bar, estimate, done_rx));
    bar.finish_and_clear();
    let raw = raw?;
    debug!("Hardware finished after {:?}", started.elapsed());

    let expected = program.acquisition_indices();
    let found = raw.indices();
    if expected != found {
        return Err(SweepError::AcquisitionMismatch { expected, found });
    }
    Ok(raw)
}

async fn run_hardware(
    program: &CompiledProgram,
    driver: &mut dyn HardwareDriver,
    timeout: Duration,
) -> SweepResult<RawResult> {
    driver.prepare(program).await.map_err(SweepError::Hardware)?;
    driver.start().await.map_err(SweepError::Hardware)?;

    let waited = tokio::time::timeout(timeout, driver.wait_done(timeout)).await;
    let failure = match waited {
        Ok(Ok(())) => None,
        Err(_) | Ok(Err(HalError::Timeout(_))) => Some(SweepError::HardwareTimeout(timeout)),
        Ok(Err(e)) => Some(SweepError::Hardware(e)),
    };
    if let Some(failure) = failure {
        if let Err(e) = driver.stop().await {
            warn!("Failed to stop {} after error: {}", driver.name(), e);
        }
        return Err(failure);
    }

    let raw = driver
        .retrieve_acquisition()
        .await
        .map_err(SweepError::Hardware)?;
    driver.stop().await.map_err(SweepError::Hardware)?;
    Ok(raw)
}

async fn track_progress(bar: &ProgressBar, estimate: Duration, mut done: oneshot::Receiver<()>) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(PROGRESS_TICK);
    loop {
        tokio::select! {
            _ = &mut done => break,
            _ = ticker.tick() => {
                let elapsed = started.elapsed().min(estimate);
                bar.set_position(elapsed.as_millis() as u64);
            }
        }
    }
}

fn progress_bar(estimate: Duration, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(estimate.as_millis().max(1) as u64);
    let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {percent}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message("measuring");
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_reads_seconds() {
        let config: ExecutionConfig =
            serde_json::from_str(r#"{"timeout": 2.5, "progress": true}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert!(config.progress);
        assert!(serde_json::from_str::<ExecutionConfig>(r#"{"timeout": -1, "progress": false}"#).is_err());
    }
}
