// src/steps/mod.rs

//! The concrete work steps of an amplicon analysis run.
//!
//! Order in a full run:
//! mount → gunzip → [spike removal] → analysis → [spike normalizer] → umount.

pub mod analysis;
pub mod fastq;
pub mod gunzip;
pub mod mount;
pub mod spikes;

use tracing::warn;

use crate::driver::SharedDriver;
use crate::exec::ExecutionResult;
use crate::pipeline::{PhaseOutcome, StepFailure};

pub use analysis::AnalysisStep;
pub use gunzip::GunzipStep;
pub use mount::{MountStep, UmountStep};
pub use spikes::{REDUCED_MAPPING_FILE, SpikeRemovalStep, SpikesNormalizerStep};

/// `"path"` for use inside a shell command.
pub(crate) fn quoted(path: &str) -> String {
    format!("\"{path}\"")
}

/// Run `command` to completion, streaming its output into the log.
pub(crate) async fn run_logged(
    driver: &SharedDriver,
    command: &str,
) -> Result<ExecutionResult, StepFailure> {
    Ok(driver.run_logged(command).await?)
}

/// Run `command`; a non-zero exit fails the step.
pub(crate) async fn run_checked(driver: &SharedDriver, command: &str) -> PhaseOutcome {
    match run_logged(driver, command).await {
        Ok(result) => PhaseOutcome::from_command(command, result),
        Err(failure) => PhaseOutcome::Fail(failure),
    }
}

/// Run a command whose exit status does not matter (status updates,
/// cleanup). Only a failure to start it fails the step.
pub(crate) async fn run_best_effort(
    driver: &SharedDriver,
    command: &str,
) -> Result<(), StepFailure> {
    let result = run_logged(driver, command).await?;
    if !result.success() {
        warn!(%command, exit_code = ?result.exit_code, "command failed; continuing");
    }
    Ok(())
}
