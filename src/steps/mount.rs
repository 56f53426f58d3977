// src/steps/mount.rs

//! Make the run folder's drive visible inside the environment, and release
//! it again at the end. Local drives are usually mounted already, so neither
//! step fails on a non-zero exit.

use tracing::{debug, warn};

use crate::analysis::{MountTable, to_environment_path};
use crate::driver::SharedDriver;
use crate::pipeline::{PhaseFuture, PhaseOutcome, WorkStep};

use super::{quoted, run_best_effort};

/// `/mnt/c` for `C:\data\x`; `None` for paths without a drive.
fn mount_point(host_path: &str) -> Option<String> {
    if host_path.starts_with('/') {
        return None;
    }
    let env = to_environment_path(host_path);
    let rest = env.strip_prefix("/mnt/")?;
    let drive = rest.split('/').next()?;
    Some(format!("/mnt/{drive}"))
}

#[derive(Debug)]
pub struct MountStep {
    driver: SharedDriver,
    host_dir: String,
}

impl MountStep {
    pub fn new(driver: SharedDriver, host_dir: impl Into<String>) -> Self {
        Self {
            driver,
            host_dir: host_dir.into(),
        }
    }
}

impl WorkStep for MountStep {
    fn name(&self) -> &str {
        "mount"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let cmd = format!("mount.py {}", quoted(&self.host_dir));
            run_best_effort(&self.driver, &cmd).await.into()
        })
    }

    /// Warn when the drive did not show up in the mount table.
    fn postcheck(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let Some(expected) = mount_point(&self.host_dir) else {
                return PhaseOutcome::Continue;
            };
            match self.driver.run_captured("mount").await {
                Ok((result, output)) if result.success() => {
                    let table = MountTable::parse(&output.stdout().text());
                    if table.has_mount_point(&expected) {
                        debug!(mount_point = %expected, "drive mounted");
                    } else {
                        warn!(mount_point = %expected, "drive does not appear in the mount table");
                    }
                }
                Ok(_) | Err(_) => debug!("could not read mount table"),
            }
            PhaseOutcome::Continue
        })
    }
}

#[derive(Debug)]
pub struct UmountStep {
    driver: SharedDriver,
    host_dir: String,
}

impl UmountStep {
    pub fn new(driver: SharedDriver, host_dir: impl Into<String>) -> Self {
        Self {
            driver,
            host_dir: host_dir.into(),
        }
    }
}

impl WorkStep for UmountStep {
    fn name(&self) -> &str {
        "umount"
    }

    fn driver(&self) -> Option<&SharedDriver> {
        Some(&self.driver)
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        Box::pin(async move {
            let cmd = format!("umount.py {}", quoted(&self.host_dir));
            run_best_effort(&self.driver, &cmd).await.into()
        })
    }
}
