// src/distro/manager.rs

//! Listing and handling of registered distributions.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::driver::NestedVmShell;
use crate::driver::discovery::find_executable;
use crate::errors::DistroError;
use crate::exec::{DEFAULT_POLL_INTERVAL, OutputEncoding, ProcessHandle};

use super::DEFAULT_DISTRO_TOOL;

/// Printed (with a failing exit code) when nothing is registered.
pub const NO_DISTRIBUTIONS_MESSAGE: &str =
    "Windows Subsystem for Linux has no installed distributions.";

/// One row of `--list --verbose`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionInfo {
    pub name: String,
    pub state: String,
    pub version: Option<u8>,
    pub is_default: bool,
}

/// Parse `--list --verbose` output:
///
/// ```text
///   NAME            STATE           VERSION
/// * Ubuntu          Running         2
///   ngstoolkitdist  Stopped         2
/// ```
pub fn parse_list(output: &str) -> Vec<DistributionInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let is_default = line.starts_with('*');
            let row = line.get(2..).unwrap_or_default().trim();
            let mut cols = row.split_whitespace();
            let name = cols.next()?.to_string();
            let state = cols.next().unwrap_or_default().to_string();
            let version = cols.next().and_then(|v| v.parse().ok());
            Some(DistributionInfo {
                name,
                state,
                version,
                is_default,
            })
        })
        .collect()
}

/// Front end to the host's distribution tool.
#[derive(Debug, Clone)]
pub struct DistributionManager {
    tool: String,
    encoding: OutputEncoding,
}

impl Default for DistributionManager {
    fn default() -> Self {
        Self {
            tool: DEFAULT_DISTRO_TOOL.to_string(),
            encoding: OutputEncoding::Utf16Le,
        }
    }
}

impl DistributionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Encoding of the tool's own management output (UTF-16LE for `wsl`).
    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    pub(crate) fn ensure_tool(&self) -> Result<(), DistroError> {
        if find_executable(&self.tool).is_none() {
            return Err(DistroError::ToolMissing(self.tool.clone()));
        }
        Ok(())
    }

    /// Run a management command to completion.
    pub(crate) async fn manage<I, S>(&self, args: I) -> Result<ProcessHandle, DistroError>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        self.ensure_tool()?;
        let mut handle = ProcessHandle::new(&self.tool, args).with_encoding(self.encoding);
        handle.start()?;
        handle.follow(DEFAULT_POLL_INTERVAL).await?;
        Ok(handle)
    }

    pub async fn list(&self) -> Result<Vec<DistributionInfo>, DistroError> {
        let handle = self.manage(["--list", "--verbose"]).await?;
        let stdout = handle.stdout().text();

        if !handle.is_successful() {
            if stdout.lines().next().map(str::trim) == Some(NO_DISTRIBUTIONS_MESSAGE) {
                debug!("no distributions registered");
                return Ok(Vec::new());
            }
            return Err(DistroError::ListFailed(handle.snapshot().text()));
        }

        let list = parse_list(&stdout);
        debug!(count = list.len(), "distributions listed");
        Ok(list)
    }

    pub async fn get(&self, name: &str) -> Result<Option<RegisteredDistribution>, DistroError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|d| d.name == name)
            .map(|d| self.registered(d.name, d.version)))
    }

    pub async fn default_distribution(&self) -> Result<Option<RegisteredDistribution>, DistroError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|d| d.is_default)
            .map(|d| self.registered(d.name, d.version)))
    }

    pub(crate) fn registered(&self, name: String, version: Option<u8>) -> RegisteredDistribution {
        RegisteredDistribution {
            name,
            version,
            manager: self.clone(),
        }
    }
}

/// A distribution the host tool knows about.
#[derive(Debug, Clone)]
pub struct RegisteredDistribution {
    name: String,
    version: Option<u8>,
    manager: DistributionManager,
}

impl RegisteredDistribution {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<u8> {
        self.version
    }

    /// `--distribution <name> [--user <user>] -- <command...>`
    pub fn run_args(&self, command: &[&str], user: Option<&str>) -> Vec<String> {
        let mut args = vec!["--distribution".to_string(), self.name.clone()];
        if let Some(user) = user {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        args.push("--".to_string());
        args.extend(command.iter().map(|c| c.to_string()));
        args
    }

    /// Run `command` inside the distribution and wait for it. Output is
    /// UTF-8, unlike the management commands.
    pub async fn run(&self, command: &[&str], user: Option<&str>) -> Result<ProcessHandle, DistroError> {
        self.manager.ensure_tool()?;
        let mut handle = ProcessHandle::new(self.manager.tool(), self.run_args(command, user));
        handle.start()?;
        handle.follow(DEFAULT_POLL_INTERVAL).await?;
        Ok(handle)
    }

    /// Execution driver targeting this distribution.
    pub fn driver(&self) -> NestedVmShell {
        NestedVmShell::new(&self.name)
            .with_tool(self.manager.tool())
            .with_vm_generation(self.version.filter(|v| *v == 2))
    }

    pub async fn export(&self, path: &Path) -> Result<(), DistroError> {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        info!(distribution = %self.name, ?path, "exporting distribution");
        let handle = self
            .manager
            .manage(["--export".into(), self.name.clone().into(), path.into_os_string()])
            .await?;
        if !handle.is_successful() {
            return Err(DistroError::ExportFailed {
                name: self.name.clone(),
                output: handle.stdout().text(),
            });
        }
        Ok(())
    }

    pub async fn unregister(&self) -> Result<(), DistroError> {
        warn!(distribution = %self.name, "unregistering distribution");
        let handle = self.manager.manage(["--unregister", self.name.as_str()]).await?;
        if !handle.is_successful() {
            return Err(DistroError::UnregisterFailed {
                name: self.name.clone(),
                output: handle.stdout().text(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_skips_header_and_marks_default() {
        let out = "  NAME            STATE           VERSION\r\n\
                   * Ubuntu          Running         2\r\n  \
                   ngstoolkitdist  Stopped         1\r\n";
        let list = parse_list(out);
        assert_eq!(
            list,
            vec![
                DistributionInfo {
                    name: "Ubuntu".into(),
                    state: "Running".into(),
                    version: Some(2),
                    is_default: true,
                },
                DistributionInfo {
                    name: "ngstoolkitdist".into(),
                    state: "Stopped".into(),
                    version: Some(1),
                    is_default: false,
                },
            ]
        );
    }

    #[test]
    fn list_ignores_blank_rows() {
        assert!(parse_list("  NAME STATE VERSION\n\n").is_empty());
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn run_args_select_distribution_and_user() {
        let d = DistributionManager::new().registered("dist".into(), Some(2));
        assert_eq!(
            d.run_args(&["ls", "/mnt/c"], Some("root")),
            vec!["--distribution", "dist", "--user", "root", "--", "ls", "/mnt/c"]
        );
        assert_eq!(d.run_args(&["true"], None), vec!["--distribution", "dist", "--", "true"]);
        assert_eq!(d.driver().prefix(), "wsl -d dist --");
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let m = DistributionManager::new().with_tool("no-such-distro-tool-93af");
        assert!(matches!(m.list().await, Err(DistroError::ToolMissing(_))));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-distro-tool");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_installation_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            &format!("printf '{NO_DISTRIBUTIONS_MESSAGE}\\nUse store to install.\\n'; exit 1"),
        );
        let m = DistributionManager::new()
            .with_tool(tool)
            .with_encoding(OutputEncoding::Utf8);
        assert!(m.list().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn finds_registered_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "printf '  NAME STATE VERSION\\n* Ubuntu Running 2\\n  ngs Stopped 2\\n'",
        );
        let m = DistributionManager::new()
            .with_tool(tool)
            .with_encoding(OutputEncoding::Utf8);

        assert_eq!(m.get("ngs").await.unwrap().unwrap().version(), Some(2));
        assert!(m.get("missing").await.unwrap().is_none());
        assert_eq!(m.default_distribution().await.unwrap().unwrap().name(), "Ubuntu");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_unregister_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'There is no distribution with the supplied name.'; exit 1");
        let m = DistributionManager::new()
            .with_tool(tool)
            .with_encoding(OutputEncoding::Utf8);
        match m.registered("gone".into(), None).unregister().await {
            Err(DistroError::UnregisterFailed { name, output }) => {
                assert_eq!(name, "gone");
                assert!(output.contains("no distribution"));
            }
            other => panic!("expected UnregisterFailed, got {other:?}"),
        }
    }
}
