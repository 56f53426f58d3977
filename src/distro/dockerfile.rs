// src/distro/dockerfile.rs

//! Building a distribution tarball from a Dockerfile with a container
//! engine, then importing it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::driver::container::DEFAULT_CONTAINER_EXECUTABLE;
use crate::errors::DistroError;
use crate::exec::{DEFAULT_POLL_INTERVAL, ProcessHandle};

use super::import::DistributionTarFile;
use super::manager::{DistributionManager, RegisteredDistribution};

#[derive(Debug, Clone)]
pub struct DockerfileDistribution {
    dockerfile: PathBuf,
    context: Option<PathBuf>,
    name: String,
    install_location: PathBuf,
    version: Option<u8>,
    build_args: BTreeMap<String, String>,
    executable: String,
    manager: DistributionManager,
}

impl DockerfileDistribution {
    pub fn new(dockerfile: impl Into<PathBuf>, name: impl Into<String>, install_location: impl Into<PathBuf>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            context: None,
            name: name.into(),
            install_location: install_location.into(),
            version: None,
            build_args: BTreeMap::new(),
            executable: DEFAULT_CONTAINER_EXECUTABLE.to_string(),
            manager: DistributionManager::new(),
        }
    }

    /// Build context; defaults to the Dockerfile's folder.
    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_version(mut self, version: Option<u8>) -> Self {
        self.version = version;
        self
    }

    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_manager(mut self, manager: DistributionManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn context(&self) -> PathBuf {
        match &self.context {
            Some(context) => context.clone(),
            None => self
                .dockerfile
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Image and container name for this build.
    pub fn build_tag(&self) -> String {
        format!("{}-build-{}", self.name.to_lowercase(), std::process::id())
    }

    pub fn default_tar_path(&self) -> PathBuf {
        self.install_location.join(format!("{}.tar", self.name))
    }

    pub fn build_args(&self, tag: &str) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            self.dockerfile.to_string_lossy().into_owned(),
            "-t".to_string(),
            tag.to_string(),
        ];
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.context().to_string_lossy().into_owned());
        args
    }

    async fn stage(&self, stage: &str, args: Vec<String>) -> Result<(), DistroError> {
        debug!(stage, "container engine stage");
        let mut handle = ProcessHandle::new(&self.executable, args);
        handle.start()?;
        let result = handle.follow(DEFAULT_POLL_INTERVAL).await?;
        if result.success() {
            return Ok(());
        }
        Err(DistroError::BuildFailed {
            stage: stage.to_string(),
            exit_code: result.exit_code,
            output: handle.snapshot().text(),
        })
    }

    /// Run an image and export its filesystem as a tarball. Returns the
    /// tarball path.
    pub async fn build_tar_file(&self, destination: Option<&Path>) -> Result<PathBuf, DistroError> {
        let tar = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_tar_path());
        let tag = self.build_tag();
        info!(name = %self.name, %tag, ?tar, "building distribution image");

        self.stage("build", self.build_args(&tag)).await?;

        if let Err(e) = self
            .stage("create", vec!["create".into(), "--name".into(), tag.clone(), tag.clone()])
            .await
        {
            self.cleanup(&tag, false).await;
            return Err(e);
        }

        let export = self
            .stage(
                "export",
                vec![
                    "export".into(),
                    "--output".into(),
                    tar.to_string_lossy().into_owned(),
                    tag.clone(),
                ],
            )
            .await;
        if let Err(e) = export {
            self.cleanup(&tag, true).await;
            return Err(e);
        }

        // Both removals run; the first failure is reported.
        let rm = self.stage("rm", vec!["rm".into(), tag.clone()]).await;
        let rmi = self.stage("rmi", vec!["rmi".into(), tag]).await;
        rm.and(rmi)?;
        Ok(tar)
    }

    async fn cleanup(&self, tag: &str, container: bool) {
        if container {
            if let Err(e) = self.stage("rm", vec!["rm".into(), tag.to_string()]).await {
                warn!(%tag, error = %e, "removing build container failed");
            }
        }
        if let Err(e) = self.stage("rmi", vec!["rmi".into(), tag.to_string()]).await {
            warn!(%tag, error = %e, "removing build image failed");
        }
    }

    /// Build the tarball and import it.
    pub async fn build(&self, force: bool) -> Result<RegisteredDistribution, DistroError> {
        let tar = self.build_tar_file(None).await?;
        DistributionTarFile::new(&self.name, &tar, &self.install_location)
            .with_version(self.version)
            .with_manager(self.manager.clone())
            .build(force)
            .await
    }
}
