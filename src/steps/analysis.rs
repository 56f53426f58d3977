// src/steps/analysis.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::analysis::{AnalysisFailure, AnalysisSettings, SETTINGS_FILE_NAME, to_environment_path};
use crate::driver::SharedDriver;
use crate::exec::ExecutionResult;
use crate::fs::FileSystem;
use crate::pipeline::{PhaseFuture, PhaseOutcome, StepFailure, WorkStep};

use super::{quoted, run_logged};

/// Writes the settings file next to the reads and runs the analysis on
/// them. The analysis exit code is mapped to a failure category in
/// `postcheck`.
#[derive(Debug)]
pub struct AnalysisStep {
    driver: SharedDriver,
    fs: Arc<dyn FileSystem>,
    data_dir: String,
    settings: AnalysisSettings,
    result: Option<ExecutionResult>,
}

impl AnalysisStep {
    pub fn new(
        driver: SharedDriver,
        fs: Arc<dyn FileSystem>,
        data_dir: impl Into<String>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            driver,
            fs,
            data_dir: data_dir.into(),
            settings,
            result: None,
        }
    }

    /// Host path of the settings file.
    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(SETTINGS_FILE_NAME)
    }

    pub fn command(&self) -> String {
        // Built from the host string so Windows separators are rewritten too.
        let settings = format!(
            "{}/{SETTINGS_FILE_NAME}",
            to_environment_path(&self.data_dir).trim_end_matches('/')
        );
        format!(
            "offline-analysis-runner.py {} {}",
            quoted(&to_environment_path(&self.data_dir)),
            quoted(&settings)
        )
    }
}

impl WorkStep for AnalysisStep {
    fn name(&self) -> &str {
        "analysis"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn prepare(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let path = self.settings_path();
            match self.settings.write_to(self.fs.as_ref(), &path) {
                Ok(()) => PhaseOutcome::Continue,
                Err(e) => PhaseOutcome::Fail(StepFailure::Io(e.to_string())),
            }
        })
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let cmd = self.command();
            info!(%cmd, "running analysis; this may take a while");
            match run_logged(&self.driver, &cmd).await {
                Ok(result) => {
                    self.result = Some(result);
                    PhaseOutcome::Continue
                }
                Err(failure) => PhaseOutcome::Fail(failure),
            }
        })
    }

    fn postcheck(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let code = self.result.and_then(|r| r.exit_code);
            match AnalysisFailure::from_exit_code(code) {
                None => PhaseOutcome::Continue,
                Some(failure) => {
                    error!(exit_code = ?code, %failure, "analysis failed");
                    PhaseOutcome::Fail(StepFailure::Analysis(failure))
                }
            }
        })
    }
}
