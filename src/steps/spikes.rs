// src/steps/spikes.rs

//! Spike-in handling around the analysis: removal of spike reads before,
//! normalization of the OTU table against the spike counts after.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::analysis::to_environment_path;
use crate::driver::SharedDriver;
use crate::fs::FileSystem;
use crate::pipeline::{PhaseFuture, PhaseOutcome, StepFailure, WorkStep};

use super::fastq::count_plain_read_files;
use super::{quoted, run_best_effort, run_checked};

/// Spike reference sequences shipped inside the environment.
pub const SPIKES_REFERENCE: &str = "/usr/local/bin/spikes.fasta";

/// Mapping file without the spike samples, written by the removal step and
/// consumed by the analysis and the normalizer.
pub const REDUCED_MAPPING_FILE: &str = "/tmp/spikes_mapping_file.tab";

pub const SPIKES_STATS_FILE: &str = "spikes.stats.tab";

/// Sample reads land here after spike removal.
pub const SAMPLES_DIR: &str = "fastq_samples";
pub const SPIKES_DIR: &str = "fastq_spikes";

#[derive(Debug)]
pub struct SpikeRemovalStep {
    driver: SharedDriver,
    fs: Arc<dyn FileSystem>,
    working_dir: String,
    mapping_file: String,
}

impl SpikeRemovalStep {
    pub fn new(
        driver: SharedDriver,
        fs: Arc<dyn FileSystem>,
        working_dir: impl Into<String>,
        mapping_file: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            fs,
            working_dir: working_dir.into(),
            mapping_file: mapping_file.into(),
        }
    }

    fn fastq_dir(&self) -> PathBuf {
        PathBuf::from(&self.working_dir).join("fastq")
    }

    pub fn command(&self) -> String {
        let input = to_environment_path(&self.working_dir);
        let samples = format!("{input}/{SAMPLES_DIR}");
        let args = [
            SPIKES_REFERENCE.to_string(),
            quoted(&to_environment_path(&self.mapping_file)),
            quoted(&format!("{input}/fastq")),
            quoted(&samples),
            quoted(&format!("{input}/{SPIKES_DIR}")),
            quoted(&format!("{samples}/{SPIKES_STATS_FILE}")),
            REDUCED_MAPPING_FILE.to_string(),
        ];
        format!("rm_spikes.py {}", args.join(" "))
    }
}

impl WorkStep for SpikeRemovalStep {
    fn name(&self) -> &str {
        "spike-removal"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn precheck(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            match count_plain_read_files(self.fs.as_ref(), &self.fastq_dir()) {
                Ok(0) => {
                    error!(dir = ?self.fastq_dir(), "no input files for spike removal");
                    PhaseOutcome::Fail(StepFailure::Precondition(
                        "no input files for spike removal".to_string(),
                    ))
                }
                Ok(count) => {
                    info!(count, "read files for spike removal");
                    PhaseOutcome::Continue
                }
                Err(e) => PhaseOutcome::Fail(StepFailure::Io(format!("{e:#}"))),
            }
        })
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let cmd = self.command();
            run_checked(&self.driver, &cmd).await
        })
    }
}

/// Normalizes the OTU table by the spike counts of each sample.
#[derive(Debug)]
pub struct SpikesNormalizerStep {
    driver: SharedDriver,
    data_dir: String,
    output_dir: String,
    otu_table_name: String,
}

impl SpikesNormalizerStep {
    pub fn new(
        driver: SharedDriver,
        data_dir: impl Into<String>,
        output_dir: impl Into<String>,
        otu_table_name: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            otu_table_name: otu_table_name.into(),
        }
    }

    pub fn command(&self) -> String {
        let out = to_environment_path(&self.output_dir);
        let data = to_environment_path(&self.data_dir);
        format!(
            "spikes_normalizer.py {} {}",
            quoted(&format!("{out}/{}", self.otu_table_name)),
            quoted(&format!("{data}/{SPIKES_STATS_FILE}"))
        )
    }
}

impl WorkStep for SpikesNormalizerStep {
    fn name(&self) -> &str {
        "spikes-normalizer"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let out = to_environment_path(&self.output_dir);
            let copy = format!(
                "cp {REDUCED_MAPPING_FILE} {}",
                quoted(&format!("{out}/spikes_mapping_file.tab"))
            );
            if let Err(failure) = run_best_effort(&self.driver, &copy).await {
                return PhaseOutcome::Fail(failure);
            }

            let cmd = self.command();
            let outcome = run_checked(&self.driver, &cmd).await;
            if !matches!(outcome, PhaseOutcome::Continue) {
                return outcome;
            }

            run_best_effort(&self.driver, &format!("rm {REDUCED_MAPPING_FILE}"))
                .await
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DirectShell;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn removal_command_layout() {
        let step = SpikeRemovalStep::new(
            Arc::new(DirectShell::new()),
            Arc::new(MockFileSystem::new()),
            r"C:\run",
            r"C:\run\mapping.tab",
        );
        assert_eq!(
            step.command(),
            "rm_spikes.py /usr/local/bin/spikes.fasta \"/mnt/c/run/mapping.tab\" \
             \"/mnt/c/run/fastq\" \"/mnt/c/run/fastq_samples\" \"/mnt/c/run/fastq_spikes\" \
             \"/mnt/c/run/fastq_samples/spikes.stats.tab\" /tmp/spikes_mapping_file.tab"
        );
    }

    #[tokio::test]
    async fn removal_requires_read_files() {
        let fs = MockFileSystem::new();
        fs.add_dir("/run/fastq");
        let mut step = SpikeRemovalStep::new(
            Arc::new(DirectShell::new()),
            Arc::new(fs.clone()),
            "/run",
            "/run/mapping.tab",
        );
        assert!(matches!(
            step.precheck().await,
            PhaseOutcome::Fail(StepFailure::Precondition(_))
        ));

        fs.add_file("/run/fastq/s_S1_L001_R1_001.fastq", "");
        assert!(matches!(step.precheck().await, PhaseOutcome::Continue));
    }

    #[test]
    fn normalizer_command_layout() {
        let step = SpikesNormalizerStep::new(
            Arc::new(DirectShell::new()),
            "/run/fastq_samples",
            "/run/out_ZOTU_210301_101500",
            "zOTUs-Table.tab",
        );
        assert_eq!(
            step.command(),
            "spikes_normalizer.py \"/run/out_ZOTU_210301_101500/zOTUs-Table.tab\" \
             \"/run/fastq_samples/spikes.stats.tab\""
        );
    }
}
