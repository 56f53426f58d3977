// src/driver/nested_vm.rs

use semver::Version;
use tracing::{debug, error};

use crate::errors::DriverError;
use crate::exec::{ExecutionResult, OutputSnapshot, ProcessHandle};

use super::discovery::find_executable;
use super::shell::DirectShell;
use super::version::{check_version_marker, check_vm_generation};
use super::{CheckFuture, ExecutionDriver};

/// Default name of the host tool that manages the nested environments.
pub const DEFAULT_VM_TOOL: &str = "wsl";

/// Runs commands inside a named VM distribution by prefixing them with the
/// host tool's environment-selection arguments and handing them to an inner
/// [`DirectShell`].
///
/// Exit status and output always mirror the inner shell.
#[derive(Debug)]
pub struct NestedVmShell {
    inner: DirectShell,
    tool: String,
    distribution: String,
    user: Option<String>,
    vm_generation: Option<u8>,
    min_version: Option<Version>,
}

impl NestedVmShell {
    pub fn new(distribution: impl Into<String>) -> Self {
        Self {
            inner: DirectShell::new(),
            tool: DEFAULT_VM_TOOL.to_string(),
            distribution: distribution.into(),
            user: None,
            vm_generation: Some(2),
            min_version: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// `None` disables the kernel generation check.
    pub fn with_vm_generation(mut self, generation: Option<u8>) -> Self {
        self.vm_generation = generation;
        self
    }

    pub fn with_min_version(mut self, version: Option<Version>) -> Self {
        self.min_version = version;
        self
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    /// `wsl -d <name> [-u <user>] --`
    pub fn prefix(&self) -> String {
        let mut prefix = format!("{} -d {}", self.tool, self.distribution);
        if let Some(user) = &self.user {
            prefix.push_str(" -u ");
            prefix.push_str(user);
        }
        prefix.push_str(" --");
        prefix
    }

    pub fn prefixed(&self, command: &str) -> String {
        format!("{} {}", self.prefix(), command)
    }

    async fn check_tool(&self) -> Result<(), DriverError> {
        if find_executable(&self.tool).is_none() {
            return Err(DriverError::ToolNotConfigured {
                tool: self.tool.clone(),
                reason: "not found on PATH".to_string(),
            });
        }

        let list_cmd = format!("{} -l", self.tool);
        let (result, _) = self.inner.run_captured(&list_cmd).await?;
        if !result.success() {
            error!(tool = %self.tool, exit_code = ?result.exit_code, "listing distributions returned a non-zero exit code");
            return Err(DriverError::ToolNotConfigured {
                tool: self.tool.clone(),
                reason: format!("`{list_cmd}` exited with {:?}", result.exit_code),
            });
        }
        debug!(tool = %self.tool, "distribution list command returned successfully");
        Ok(())
    }
}

impl ExecutionDriver for NestedVmShell {
    fn name(&self) -> &str {
        "nested-vm"
    }

    fn run(&self, command: &str) -> Result<ProcessHandle, DriverError> {
        self.inner.run(&self.prefixed(command))
    }

    fn self_check(&self) -> CheckFuture<'_> {
        Box::pin(async move {
            self.check_tool().await?;

            let (result, _) = self.run_captured("true").await?;
            if !result.success() {
                error!(distribution = %self.distribution, "distribution unknown or not startable");
                return Err(DriverError::EnvironmentUnreachable {
                    environment: self.distribution.clone(),
                    exit_code: result.exit_code,
                });
            }
            debug!(distribution = %self.distribution, "distribution reachable");

            if self.vm_generation == Some(2) {
                check_vm_generation(self).await?;
            }
            if let Some(required) = &self.min_version {
                check_version_marker(self, required).await?;
            }
            Ok(())
        })
    }

    fn last_result(&self) -> ExecutionResult {
        self.inner.last_result()
    }

    fn last_output(&self) -> Option<OutputSnapshot> {
        self.inner.last_output()
    }

    fn run_count(&self) -> u64 {
        self.inner.run_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::version::VERSION_MARKER_PATH;

    #[test]
    fn prefix_selects_distribution_and_user() {
        let vm = NestedVmShell::new("ngstoolkitdist");
        assert_eq!(vm.prefix(), "wsl -d ngstoolkitdist --");
        assert_eq!(vm.prefixed("cat /proc/version"), "wsl -d ngstoolkitdist -- cat /proc/version");

        let vm = NestedVmShell::new("dist").with_user("root");
        assert_eq!(vm.prefix(), "wsl -d dist -u root --");
    }

    #[tokio::test]
    async fn missing_tool_fails_first_check() {
        let vm = NestedVmShell::new("dist").with_tool("no-such-vm-tool-7c1e");
        match vm.self_check().await {
            Err(DriverError::ToolNotConfigured { tool, .. }) => assert_eq!(tool, "no-such-vm-tool-7c1e"),
            other => panic!("expected ToolNotConfigured, got {other:?}"),
        }
        assert_eq!(vm.run_count(), 0);
    }

    /// A stand-in for the host tool: `-l` succeeds, everything after `--`
    /// is executed by `sh` unless `reachable` is false.
    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, reachable: bool) -> String {
        use std::os::unix::fs::PermissionsExt;

        let body = if reachable {
            "while [ \"$1\" != \"--\" ]; do shift; done; shift; exec sh -c \"$*\""
        } else {
            "exit 1"
        };
        let script = format!("#!/bin/sh\nif [ \"$1\" = \"-l\" ]; then exit 0; fi\n{body}\n");
        let path = dir.join("fake-vm-tool");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreachable_environment_fails_second_check() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist").with_tool(fake_tool(dir.path(), false));

        match vm.self_check().await {
            Err(DriverError::EnvironmentUnreachable { environment, exit_code }) => {
                assert_eq!(environment, "dist");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("expected EnvironmentUnreachable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_version_marker_fails_third_check() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist")
            .with_tool(fake_tool(dir.path(), true))
            .with_vm_generation(None)
            .with_min_version(Some(Version::new(99, 0, 0)));

        assert!(matches!(
            vm.self_check().await,
            Err(DriverError::IncompatibleVersion { .. })
        ));
    }

    /// A reachable environment whose kernel line and toolkit marker are
    /// canned answers.
    #[cfg(unix)]
    fn fake_environment(dir: &std::path::Path, proc_version: &str, marker: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-l\" ]; then exit 0; fi\n\
             while [ \"$1\" != \"--\" ]; do shift; done; shift\n\
             case \"$*\" in\n\
             \"cat /proc/version\") echo '{proc_version}' ;;\n\
             \"cat {VERSION_MARKER_PATH}\") echo '{marker}' ;;\n\
             *) exec sh -c \"$*\" ;;\n\
             esac\n"
        );
        let path = dir.join("fake-vm-env");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn older_marker_than_required_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist")
            .with_tool(fake_environment(dir.path(), "Linux version 5.10", "1.4"))
            .with_vm_generation(None)
            .with_min_version(Some(Version::new(2, 0, 0)));

        match vm.self_check().await {
            Err(DriverError::IncompatibleVersion { found, required }) => {
                assert_eq!(found, "1.4.0");
                assert_eq!(required, "2.0.0");
            }
            other => panic!("expected IncompatibleVersion, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn newer_marker_than_required_passes() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist")
            .with_tool(fake_environment(dir.path(), "Linux version 5.10", "1.4"))
            .with_vm_generation(None)
            .with_min_version(Some(Version::new(1, 2, 0)));

        vm.self_check().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn old_gcc_kernel_is_not_second_generation() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist")
            .with_tool(fake_environment(
                dir.path(),
                "Linux version 4.4.0-19041-Microsoft (gcc version 5.4.0 (GCC) )",
                "2.1",
            ))
            .with_vm_generation(Some(2));

        match vm.self_check().await {
            Err(DriverError::IncompatibleVersion { found, .. }) => assert_eq!(found, "gcc 5 kernel"),
            other => panic!("expected IncompatibleVersion, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn gcc_8_kernel_passes_generation_check() {
        let dir = tempfile::tempdir().unwrap();
        let vm = NestedVmShell::new("dist")
            .with_tool(fake_environment(
                dir.path(),
                "Linux version 4.19.84-microsoft-standard (gcc version 8.2.0 (GCC))",
                "2.1",
            ))
            .with_vm_generation(Some(2));

        vm.self_check().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listing_failure_is_a_tool_error() {
        let vm = NestedVmShell::new("dist").with_tool("false");
        assert!(matches!(
            vm.self_check().await,
            Err(DriverError::ToolNotConfigured { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_mirrors_inner_shell() {
        // `true -d dist -- <cmd>` ignores its arguments and exits 0.
        let vm = NestedVmShell::new("dist").with_tool("true");
        let result = vm.run_logged("exit 5").await.unwrap();
        assert!(result.success());
        assert_eq!(vm.last_result(), vm.inner.last_result());
        assert_eq!(vm.run_count(), 1);
    }
}
