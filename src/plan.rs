// src/plan.rs

//! Turning a validated run file into the ordered list of work steps.
//!
//! mount → gunzip → [spike removal] → analysis → [spike normalizer] → umount

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::analysis::{AnalysisSettings, has_drive_letter};
use crate::config::ConfigFile;
use crate::driver::SharedDriver;
use crate::fs::FileSystem;
use crate::pipeline::Pipeline;
use crate::steps::spikes::SAMPLES_DIR;
use crate::steps::{
    AnalysisStep, GunzipStep, MountStep, REDUCED_MAPPING_FILE, SpikeRemovalStep,
    SpikesNormalizerStep, UmountStep,
};

/// Timestamp format of generated output folders.
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%y%m%d_%H%M%S";

/// `dir` + `name` with the separator `dir` already uses.
pub fn join_host(dir: &str, name: &str) -> String {
    let sep = if dir.contains('\\') { '\\' } else { '/' };
    format!("{}{sep}{name}", dir.trim_end_matches(['/', '\\']))
}

/// Everything a run will do, resolved up front.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub working_dir: String,
    /// Drive paths need their drive mounted inside the environment first.
    pub mount: bool,
    pub fastq_dir: String,
    pub keep_compressed: bool,
    /// Host mapping file handed to spike removal.
    pub spikes_mapping_file: Option<String>,
    /// Folder the analysis reads from and writes `settings.ini` into.
    pub data_dir: String,
    pub settings: AnalysisSettings,
}

impl RunPlan {
    pub fn from_config(cfg: &ConfigFile, now: NaiveDateTime) -> Self {
        let run = &cfg.run;
        let working_dir = run.working_dir.clone();
        let outpath = run.outpath.clone().unwrap_or_else(|| {
            join_host(
                &working_dir,
                &format!(
                    "out_{}_{}",
                    cfg.analysis.mode.as_str().to_uppercase(),
                    now.format(OUTPUT_TIMESTAMP_FORMAT)
                ),
            )
        });

        let fastq_dir = join_host(&working_dir, "fastq");
        let (spikes_mapping_file, data_dir, mapping_file) = if run.spikes {
            (
                run.mapping_file.clone(),
                join_host(&working_dir, SAMPLES_DIR),
                Some(REDUCED_MAPPING_FILE.to_string()),
            )
        } else {
            (None, fastq_dir.clone(), run.mapping_file.clone())
        };

        Self {
            mount: has_drive_letter(&working_dir),
            working_dir,
            fastq_dir,
            keep_compressed: run.keep_compressed,
            spikes_mapping_file,
            data_dir,
            settings: AnalysisSettings::new(outpath, cfg.analysis.clone()).with_mapping_file(mapping_file),
        }
    }

    pub fn spikes(&self) -> bool {
        self.spikes_mapping_file.is_some()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.mount {
            names.push("mount");
        }
        names.push("gunzip");
        if self.spikes() {
            names.push("spike-removal");
        }
        names.push("analysis");
        if self.spikes() {
            names.push("spikes-normalizer");
        }
        if self.mount {
            names.push("umount");
        }
        names
    }

    pub fn into_pipeline(self, driver: SharedDriver, fs: Arc<dyn FileSystem>) -> Pipeline {
        let mut pipeline = Pipeline::new();

        if self.mount {
            pipeline.add_work(MountStep::new(Arc::clone(&driver), &self.working_dir));
        }

        pipeline.add_work(
            GunzipStep::new(Arc::clone(&driver), Arc::clone(&fs), &self.fastq_dir)
                .keep_gz_files(self.keep_compressed),
        );

        if let Some(mapping) = &self.spikes_mapping_file {
            pipeline.add_work(SpikeRemovalStep::new(
                Arc::clone(&driver),
                Arc::clone(&fs),
                &self.working_dir,
                mapping,
            ));
        }

        let outpath = self.settings.outpath.clone();
        let table = self.settings.params.mode.otu_table_name();
        pipeline.add_work(AnalysisStep::new(
            Arc::clone(&driver),
            Arc::clone(&fs),
            &self.data_dir,
            self.settings,
        ));

        if self.spikes_mapping_file.is_some() {
            pipeline.add_work(SpikesNormalizerStep::new(
                Arc::clone(&driver),
                &self.data_dir,
                outpath,
                table,
            ));
        }

        if self.mount {
            pipeline.add_work(UmountStep::new(driver, &self.working_dir));
        }

        pipeline
    }
}
