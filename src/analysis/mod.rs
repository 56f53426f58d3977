// src/analysis/mod.rs

//! Contract with the in-environment analysis runner: the settings file it
//! reads, the path convention it expects, and the exit codes it reports.

pub mod exit;
pub mod paths;
pub mod settings;

pub use exit::AnalysisFailure;
pub use paths::{MountEntry, MountTable, has_drive_letter, to_environment_path};
pub use settings::{AnalysisParameters, AnalysisSettings, SETTINGS_FILE_NAME};
