// src/driver/shell.rs

use tracing::debug;

use crate::errors::DriverError;
use crate::exec::{ExecutionResult, OutputEncoding, OutputSnapshot, ProcessHandle};

use super::discovery::find_executable;
use super::{CheckFuture, ExecutionDriver, RunTracker};

/// Runs commands through the host's own shell.
#[derive(Debug, Default)]
pub struct DirectShell {
    encoding: OutputEncoding,
    tracker: RunTracker,
}

impl DirectShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Shell program and the flag that makes it run a command string.
    pub fn shell() -> (&'static str, &'static str) {
        if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") }
    }

    /// Build (but do not start) the handle for `command`.
    pub fn handle_for(&self, command: &str) -> ProcessHandle {
        let (program, flag) = Self::shell();
        ProcessHandle::new(program, [flag, command]).with_encoding(self.encoding)
    }
}

impl ExecutionDriver for DirectShell {
    fn name(&self) -> &str {
        "shell"
    }

    fn run(&self, command: &str) -> Result<ProcessHandle, DriverError> {
        debug!(driver = self.name(), %command, "running command");
        let mut handle = self.handle_for(command);
        handle.start()?;
        self.tracker.track(&handle);
        Ok(handle)
    }

    fn self_check(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            let (program, _) = Self::shell();
            if find_executable(program).is_none() {
                return Err(DriverError::ToolNotConfigured {
                    tool: program.to_string(),
                    reason: "not found on PATH".to_string(),
                });
            }

            let (result, _) = self.run_captured("exit 0").await?;
            if !result.success() {
                return Err(DriverError::EnvironmentUnreachable {
                    environment: "host shell".to_string(),
                    exit_code: result.exit_code,
                });
            }

            debug!(driver = self.name(), "self check passed");
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_tracks_last_result() {
        let driver = DirectShell::new();
        assert_eq!(driver.last_result().exit_code, None);
        assert!(!driver.success());

        let (result, output) = driver.run_captured("printf 'a\\nb'").await.unwrap();
        assert!(result.success());
        assert_eq!(output.contents(), vec!["a\n", "b"]);
        assert!(driver.success());
        assert_eq!(driver.run_count(), 1);

        let result = driver.run_logged("exit 123").await.unwrap();
        assert_eq!(result.exit_code, Some(123));
        assert_eq!(driver.last_result().exit_code, Some(123));
        assert!(!driver.success());
        assert_eq!(driver.run_count(), 2);
    }

    #[tokio::test]
    async fn last_output_follows_latest_process() {
        let driver = DirectShell::new();
        driver.run_captured("echo first").await.unwrap();
        driver.run_captured("echo second 1>&2").await.unwrap();

        let out = driver.last_output().unwrap();
        assert_eq!(out.stderr().contents(), vec!["second\n"]);
        assert!(out.stdout().is_empty());
    }

    #[tokio::test]
    async fn self_check_passes_on_unix_host() {
        DirectShell::new().self_check().await.unwrap();
    }
}
