// src/driver/container.rs

use semver::Version;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::errors::DriverError;
use crate::exec::{ExecutionResult, OutputSnapshot, ProcessHandle};

use super::discovery::find_executable;
use super::version::check_version_marker;
use super::{CheckFuture, ExecutionDriver, RunTracker};

/// Default container engine. `podman` is a drop-in replacement.
pub const DEFAULT_CONTAINER_EXECUTABLE: &str = "docker";

/// Host directory made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeMount {
    pub host: String,
    pub guest: String,
}

/// Keeps a detached container alive without doing anything.
const IDLE_COMMAND: [&str; 3] = ["tail", "-f", "/dev/null"];

/// Engine arguments that start a detached container from `image`.
pub fn session_args(image: &str, volumes: &[VolumeMount]) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string(), "--rm".to_string()];
    for v in volumes {
        args.push("-v".to_string());
        args.push(format!("{}:{}", v.host, v.guest));
    }
    args.push(image.to_string());
    args.extend(IDLE_COMMAND.iter().map(|s| s.to_string()));
    args
}

async fn check_engine(executable: &str) -> Result<(), DriverError> {
    if find_executable(executable).is_none() {
        return Err(DriverError::ToolNotConfigured {
            tool: executable.to_string(),
            reason: "not found on PATH".to_string(),
        });
    }

    let mut version_cmd = ProcessHandle::new(executable, ["--version"]);
    version_cmd.start()?;
    let result = version_cmd.wait().await?;
    if !result.success() {
        error!(engine = %executable, exit_code = ?result.exit_code, "container engine version check failed");
        return Err(DriverError::ToolNotConfigured {
            tool: executable.to_string(),
            reason: format!("`{executable} --version` exited with {:?}", result.exit_code),
        });
    }
    debug!(engine = %executable, version = %version_cmd.stdout().text().trim(), "container engine found");
    Ok(())
}

/// A detached container started from an image for the length of one run.
///
/// Every command of the run is exec'd into it, so files one step leaves in
/// the container (and the status file) are visible to the next.
#[derive(Debug)]
pub struct ContainerSession {
    executable: String,
    image: String,
    id: String,
}

impl ContainerSession {
    pub async fn start(
        executable: &str,
        image: &str,
        volumes: &[VolumeMount],
    ) -> Result<Self, DriverError> {
        check_engine(executable).await?;

        let mut handle = ProcessHandle::new(executable, session_args(image, volumes));
        handle.start()?;
        let result = handle.wait().await?;
        let stdout = handle.stdout().text();
        let id = stdout.lines().map(str::trim).find(|l| !l.is_empty());

        match id {
            Some(id) if result.success() => {
                info!(%image, container = %id, "started run container");
                Ok(Self {
                    executable: executable.to_string(),
                    image: image.to_string(),
                    id: id.to_string(),
                })
            }
            _ => {
                error!(%image, exit_code = ?result.exit_code, output = %handle.snapshot(), "could not start run container");
                Err(DriverError::EnvironmentUnreachable {
                    environment: image.to_string(),
                    exit_code: result.exit_code,
                })
            }
        }
    }

    /// Container id as printed by the engine.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// A driver exec'ing into this container.
    pub fn shell(&self) -> RemoteContainerShell {
        RemoteContainerShell::new(&self.id).with_executable(&self.executable)
    }

    /// Kill and remove the container.
    pub async fn stop(self) -> Result<(), DriverError> {
        let mut handle = ProcessHandle::new(&self.executable, ["rm", "-f", self.id.as_str()]);
        handle.start()?;
        let result = handle.wait().await?;
        if !result.success() {
            warn!(container = %self.id, exit_code = ?result.exit_code, "could not remove run container");
            return Err(DriverError::EnvironmentUnreachable {
                environment: self.id,
                exit_code: result.exit_code,
            });
        }
        debug!(container = %self.id, "removed run container");
        Ok(())
    }
}

/// Runs commands inside a running container through the container engine
/// CLI (`<engine> exec <container> sh -c <command>`).
#[derive(Debug)]
pub struct RemoteContainerShell {
    executable: String,
    container: String,
    min_version: Option<Version>,
    tracker: RunTracker,
}

impl RemoteContainerShell {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            executable: DEFAULT_CONTAINER_EXECUTABLE.to_string(),
            container: container.into(),
            min_version: None,
            tracker: RunTracker::default(),
        }
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_min_version(mut self, version: Option<Version>) -> Self {
        self.min_version = version;
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Engine arguments for `command`.
    pub fn engine_args(&self, command: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            self.container.clone(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]
    }
}

impl ExecutionDriver for RemoteContainerShell {
    fn name(&self) -> &str {
        "container"
    }

    fn run(&self, command: &str) -> Result<ProcessHandle, DriverError> {
        debug!(driver = self.name(), container = %self.container, %command, "running command");
        let mut handle = ProcessHandle::new(&self.executable, self.engine_args(command));
        handle.start()?;
        self.tracker.track(&handle);
        Ok(handle)
    }

    fn self_check(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            check_engine(&self.executable).await?;

            let (result, _) = self.run_captured("true").await?;
            if !result.success() {
                error!(container = %self.container, "container not reachable");
                return Err(DriverError::EnvironmentUnreachable {
                    environment: self.container.clone(),
                    exit_code: result.exit_code,
                });
            }

            if let Some(required) = &self.min_version {
                check_version_marker(self, required).await?;
            }
            Ok(())
        })
    }

    fn last_result(&self) -> ExecutionResult {
        self.tracker.last_result()
    }

    fn last_output(&self) -> Option<OutputSnapshot> {
        self.tracker.last_output()
    }

    fn run_count(&self) -> u64 {
        self.tracker.run_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_starts_idle_detached_container() {
        let volumes = vec![VolumeMount {
            host: "/data".into(),
            guest: "/mnt/data".into(),
        }];
        assert_eq!(
            session_args("ngstoolkitdist:latest", &volumes),
            vec![
                "run", "-d", "--rm", "-v", "/data:/mnt/data", "ngstoolkitdist:latest", "tail", "-f",
                "/dev/null",
            ]
        );
    }

    #[test]
    fn commands_are_execd_into_the_container() {
        let shell = RemoteContainerShell::new("worker").with_executable("podman");
        assert_eq!(shell.engine_args("true"), vec!["exec", "worker", "sh", "-c", "true"]);
        assert_eq!(shell.executable, "podman");
    }

    #[tokio::test]
    async fn missing_engine_is_reported() {
        let shell = RemoteContainerShell::new("worker").with_executable("no-such-engine-41b2");
        assert!(matches!(
            shell.self_check().await,
            Err(DriverError::ToolNotConfigured { .. })
        ));
        assert!(matches!(
            ContainerSession::start("no-such-engine-41b2", "img", &[]).await,
            Err(DriverError::ToolNotConfigured { .. })
        ));
    }

    #[cfg(unix)]
    fn fake_engine(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-engine");
        let script = format!(
            "#!/bin/sh\n[ \"$1\" = --version ] && exit 0\necho \"$*\" >> '{}/calls'\n{body}\n",
            dir.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn calls(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn consecutive_commands_share_one_container() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), r#"if [ "$1" = run ]; then echo 3f9c2e1a; fi"#);

        let session = ContainerSession::start(&engine, "ngstoolkit", &[]).await.unwrap();
        assert_eq!(session.id(), "3f9c2e1a");

        let shell = session.shell();
        shell.run_logged("rm_spikes.py").await.unwrap();
        shell.run_logged("cat /tmp/spikes_mapping_file.tab").await.unwrap();
        let status = session.shell();
        status.run_logged("cat /usr/local/bin/status.txt").await.unwrap();
        session.stop().await.unwrap();

        assert_eq!(
            calls(dir.path()),
            vec![
                "run -d --rm ngstoolkit tail -f /dev/null",
                "exec 3f9c2e1a sh -c rm_spikes.py",
                "exec 3f9c2e1a sh -c cat /tmp/spikes_mapping_file.tab",
                "exec 3f9c2e1a sh -c cat /usr/local/bin/status.txt",
                "rm -f 3f9c2e1a",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_start_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "echo 'no such image' >&2; exit 125");

        let err = ContainerSession::start(&engine, "missing:1", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            DriverError::EnvironmentUnreachable { ref environment, exit_code: Some(125) } if environment == "missing:1"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_through_engine_and_tracks_status() {
        // `env exec worker sh -c ...` fails: env cannot find `exec`. That is
        // enough to see the non-zero status propagate.
        let shell = RemoteContainerShell::new("worker").with_executable("env");
        let result = shell.run_logged("true").await.unwrap();
        assert!(!result.success());
        assert_eq!(shell.last_result(), result);
        assert!(shell.last_output().is_some());
    }
}
