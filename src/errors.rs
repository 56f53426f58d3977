// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own `thiserror` enum so callers can match on the
//! category they care about:
//! - [`ProcessError`]: spawning / waiting on a single OS process.
//! - [`DriverError`]: prerequisite checks of an execution driver.
//! - [`DistroError`]: distribution management commands.
//! - [`SettingsError`]: the analysis settings artifact.
//!
//! [`NgspipeError`] covers loading and validating the run file.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("cannot start process '{program}': {source}")]
    CannotStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process '{0}' was already started")]
    AlreadyStarted(String),

    #[error("process '{0}' was never started")]
    NotStarted(String),

    #[error("waiting for process '{program}' failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("host tool '{tool}' is not configured: {reason}")]
    ToolNotConfigured { tool: String, reason: String },

    #[error("environment '{environment}' is not reachable (exit code {exit_code:?})")]
    EnvironmentUnreachable {
        environment: String,
        exit_code: Option<i32>,
    },

    #[error("incompatible environment version: found {found}, required {required}")]
    IncompatibleVersion { found: String, required: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Error, Debug)]
pub enum DistroError {
    #[error("distribution tool not found on PATH: {0}")]
    ToolMissing(String),

    #[error("listing distributions failed: {0}")]
    ListFailed(String),

    #[error("a distribution named '{name}' already exists")]
    DuplicateName { name: String, output: String },

    #[error("install location {location:?} is already in use")]
    InstallLocationInUse { location: PathBuf, output: String },

    #[error("importing distribution '{name}' failed (exit code {exit_code:?}): {output}")]
    ImportFailed {
        name: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("exporting distribution '{name}' failed: {output}")]
    ExportFailed { name: String, output: String },

    #[error("unregistering distribution '{name}' failed: {output}")]
    UnregisterFailed { name: String, output: String },

    #[error("distribution '{0}' is not registered after import")]
    NotRegistered(String),

    #[error("image build step '{stage}' failed (exit code {exit_code:?}): {output}")]
    BuildFailed {
        stage: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings file has no [{0}] section")]
    MissingSection(String),

    #[error("settings key '{0}' is missing")]
    MissingKey(String),

    #[error("settings key '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("malformed settings line {line}: {content}")]
    Malformed { line: usize, content: String },

    #[error("settings storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum NgspipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, NgspipeError>;
