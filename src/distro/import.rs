// src/distro/import.rs

//! Registering a distribution from a root filesystem tarball.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::DistroError;
use crate::exec::ExecutionResult;

use super::manager::{DistributionManager, RegisteredDistribution};

/// Exact stdout of a failed import when the name is taken.
pub const DUPLICATE_NAME_MESSAGE: &str = "A distribution with the supplied name already exists.\n\n";

/// Exact stdout of a failed import when the folder already holds a disk.
pub const LOCATION_IN_USE_MESSAGE: &str = "The supplied install location is already in use.\n\n";

/// Map a failed import to its error. `stdout` is compared exactly, after
/// normalizing CRLF line endings.
pub fn translate_import_failure(
    name: &str,
    location: &Path,
    result: ExecutionResult,
    stdout: &str,
) -> DistroError {
    let normalized = stdout.replace("\r\n", "\n");
    if result.is_generic_failure() {
        if normalized == DUPLICATE_NAME_MESSAGE {
            return DistroError::DuplicateName {
                name: name.to_string(),
                output: normalized,
            };
        }
        if normalized == LOCATION_IN_USE_MESSAGE {
            return DistroError::InstallLocationInUse {
                location: location.to_path_buf(),
                output: normalized,
            };
        }
    }
    DistroError::ImportFailed {
        name: name.to_string(),
        exit_code: result.exit_code,
        output: normalized,
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A tarball plus the name and folder it should be registered under.
#[derive(Debug, Clone)]
pub struct DistributionTarFile {
    name: String,
    tar_file: PathBuf,
    install_location: PathBuf,
    version: Option<u8>,
    manager: DistributionManager,
}

impl DistributionTarFile {
    pub fn new(name: impl Into<String>, tar_file: impl AsRef<Path>, install_location: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            tar_file: absolute(tar_file.as_ref()),
            install_location: absolute(install_location.as_ref()),
            version: None,
            manager: DistributionManager::new(),
        }
    }

    pub fn with_version(mut self, version: Option<u8>) -> Self {
        self.version = version;
        self
    }

    pub fn with_manager(mut self, manager: DistributionManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `--import <name> <location> <tar> [--version N]`
    pub fn import_args(&self) -> Vec<String> {
        let mut args = vec![
            "--import".to_string(),
            self.name.clone(),
            self.install_location.to_string_lossy().into_owned(),
            self.tar_file.to_string_lossy().into_owned(),
        ];
        if let Some(version) = self.version {
            args.push("--version".to_string());
            args.push(version.to_string());
        }
        args
    }

    async fn import(&self) -> Result<(), DistroError> {
        info!(name = %self.name, tar = ?self.tar_file, location = ?self.install_location, "importing distribution");
        let handle = self.manager.manage(self.import_args()).await?;
        if handle.is_successful() {
            return Ok(());
        }
        Err(translate_import_failure(
            &self.name,
            &self.install_location,
            handle.result(),
            &handle.stdout().text(),
        ))
    }

    /// Import the tarball and return the registered distribution.
    ///
    /// With `force`, an existing distribution of the same name is
    /// unregistered and the import retried once.
    pub async fn build(&self, force: bool) -> Result<RegisteredDistribution, DistroError> {
        match self.import().await {
            Ok(()) => {}
            Err(DistroError::DuplicateName { .. }) if force => {
                warn!(name = %self.name, "distribution exists; replacing it");
                if let Some(existing) = self.manager.get(&self.name).await? {
                    existing.unregister().await?;
                }
                self.import().await?;
            }
            Err(e) => return Err(e),
        }

        self.manager
            .get(&self.name)
            .await?
            .ok_or_else(|| DistroError::NotRegistered(self.name.clone()))
    }
}

impl DistributionManager {
    /// Shorthand for a [`DistributionTarFile`] managed by this tool.
    pub fn tar_file(&self, name: &str, tar_file: &Path, install_location: &Path) -> DistributionTarFile {
        DistributionTarFile::new(name, tar_file, install_location).with_manager(self.clone())
    }
}
