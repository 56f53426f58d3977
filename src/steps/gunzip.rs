// src/steps/gunzip.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::analysis::to_environment_path;
use crate::driver::SharedDriver;
use crate::fs::FileSystem;
use crate::pipeline::{PhaseFuture, PhaseOutcome, StepFailure, WorkStep};

use super::fastq::{count_gzipped_read_files, each_file_has_decompressed_version};
use super::{quoted, run_best_effort, run_checked};

/// Decompresses the `.fastq.gz` read files of a folder in place.
///
/// Skips itself when there is nothing to decompress.
#[derive(Debug)]
pub struct GunzipStep {
    driver: SharedDriver,
    fs: Arc<dyn FileSystem>,
    host_dir: String,
    keep_gz: bool,
}

impl GunzipStep {
    pub fn new(driver: SharedDriver, fs: Arc<dyn FileSystem>, host_dir: impl Into<String>) -> Self {
        Self {
            driver,
            fs,
            host_dir: host_dir.into(),
            keep_gz: true,
        }
    }

    pub fn keep_gz_files(mut self, keep: bool) -> Self {
        self.keep_gz = keep;
        self
    }

    pub fn command(&self) -> String {
        let keep_flag = if self.keep_gz { "-k " } else { "" };
        format!(
            "gunzip -f {keep_flag}{}/*.fastq.gz",
            quoted(&to_environment_path(&self.host_dir))
        )
    }

    fn check_inputs(&self) -> Result<bool, StepFailure> {
        let dir = PathBuf::from(&self.host_dir);
        let io = |e: anyhow::Error| StepFailure::Io(format!("{e:#}"));
        let gzipped = count_gzipped_read_files(self.fs.as_ref(), &dir).map_err(io)?;
        if gzipped < 1 {
            return Ok(false);
        }
        Ok(!each_file_has_decompressed_version(self.fs.as_ref(), &dir).map_err(io)?)
    }
}

impl WorkStep for GunzipStep {
    fn name(&self) -> &str {
        "gunzip"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn precheck(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            match self.check_inputs() {
                Ok(true) => PhaseOutcome::Continue,
                Ok(false) => PhaseOutcome::SkipRest(
                    "no gunzip needed: no gzipped files found or files already unzipped".to_string(),
                ),
                Err(failure) => PhaseOutcome::Fail(failure),
            }
        })
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            if let Err(failure) = run_best_effort(&self.driver, "set_status.py \"Decompressing files\"").await {
                return PhaseOutcome::Fail(failure);
            }
            let cmd = self.command();
            info!(dir = %self.host_dir, "decompressing read files");
            run_checked(&self.driver, &cmd).await
        })
    }
}
