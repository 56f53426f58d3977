// src/driver/select.rs

//! Picking a driver for the current host or from the run configuration.

use std::sync::Arc;

use tracing::debug;

use crate::config::DriverConfig;
use crate::distro::DEFAULT_DISTRIBUTION;
use crate::errors::DriverError;
use crate::types::DriverKind;

use super::container::ContainerSession;
use super::{DirectShell, NestedVmShell, RemoteContainerShell, SharedDriver};

/// DirectShell on Linux, the toolkit distribution on Windows.
pub fn best_driver() -> SharedDriver {
    if cfg!(windows) {
        Arc::new(NestedVmShell::new(DEFAULT_DISTRIBUTION))
    } else {
        Arc::new(DirectShell::new())
    }
}

impl DriverConfig {
    /// Prepare the environment for one run.
    ///
    /// For `docker` without a named `container` this starts a detached
    /// container from `image`; [`DriverSession::close`] removes it again.
    pub async fn open(&self) -> Result<DriverSession, DriverError> {
        let owned = match (self.kind, &self.container) {
            (DriverKind::Docker, None) => {
                Some(ContainerSession::start(&self.executable, &self.image, &self.volumes).await?)
            }
            _ => None,
        };
        Ok(DriverSession {
            config: self.clone(),
            owned,
        })
    }
}

/// The configured environment, open for the length of one run.
#[derive(Debug)]
pub struct DriverSession {
    config: DriverConfig,
    owned: Option<ContainerSession>,
}

impl DriverSession {
    /// Build a driver into the environment. Every call returns a fresh
    /// driver with its own run history.
    pub fn driver(&self) -> SharedDriver {
        let cfg = &self.config;
        debug!(kind = ?cfg.kind, "building execution driver");
        match cfg.kind {
            DriverKind::Shell => Arc::new(DirectShell::new()),
            DriverKind::Wsl => {
                let mut vm = NestedVmShell::new(&cfg.distribution)
                    .with_tool(&cfg.tool)
                    .with_vm_generation(cfg.vm_generation)
                    .with_min_version(cfg.min_version.clone());
                if let Some(user) = &cfg.user {
                    vm = vm.with_user(user);
                }
                Arc::new(vm)
            }
            DriverKind::Docker => {
                let container = match &self.owned {
                    Some(session) => session.id(),
                    None => cfg.container.as_deref().unwrap_or_default(),
                };
                Arc::new(
                    RemoteContainerShell::new(container)
                        .with_executable(&cfg.executable)
                        .with_min_version(cfg.min_version.clone()),
                )
            }
        }
    }

    /// Container started by [`DriverConfig::open`], if any.
    pub fn container(&self) -> Option<&ContainerSession> {
        self.owned.as_ref()
    }

    /// Remove the container this session started.
    pub async fn close(self) -> Result<(), DriverError> {
        match self.owned {
            Some(session) => session.stop().await,
            None => Ok(()),
        }
    }
}
