// src/driver/mod.rs

//! Execution drivers: *how* a command reaches the environment it runs in.
//!
//! Every driver takes a shell command string and returns a started
//! [`ProcessHandle`]. Drivers also remember the last process they launched so
//! steps can ask "did that work?" after the fact.
//!
//! - [`shell`]: [`DirectShell`], `sh -c` / `cmd /C` on the host.
//! - [`nested_vm`]: [`NestedVmShell`], a DirectShell with a
//!   `wsl -d <name> --` prefix.
//! - [`container`]: [`RemoteContainerShell`] (`docker exec`) and the
//!   per-run [`ContainerSession`] it execs into.
//! - [`select`]: picks or builds a driver from configuration.
//! - [`discovery`] / [`version`]: helpers for `self_check`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::DriverError;
use crate::exec::{
    DEFAULT_POLL_INTERVAL, ExecutionResult, ExitSlot, OutputLog, OutputSnapshot, ProcessHandle,
};

pub mod container;
pub mod discovery;
pub mod nested_vm;
pub mod select;
pub mod shell;
pub mod version;

pub use container::{ContainerSession, RemoteContainerShell, VolumeMount};
pub use nested_vm::NestedVmShell;
pub use select::{DriverSession, best_driver};
pub use shell::DirectShell;

/// Future returned by [`ExecutionDriver::self_check`].
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DriverError>> + Send + 'a>>;

/// Future returned by the convenience runners.
pub type RunFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Capability shared by all drivers.
pub trait ExecutionDriver: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start `command` and return the running process.
    fn run(&self, command: &str) -> Result<ProcessHandle, DriverError>;

    /// Verify prerequisites: host tool present, environment reachable,
    /// version compatible. Checks run in that order and stop at the first
    /// failure.
    fn self_check(&self) -> CheckFuture<'_>;

    /// Exit status of the most recently launched process.
    fn last_result(&self) -> ExecutionResult;

    /// Output of the most recently launched process.
    fn last_output(&self) -> Option<OutputSnapshot>;

    /// Number of processes this driver has launched.
    fn run_count(&self) -> u64;

    fn success(&self) -> bool {
        self.last_result().success()
    }

    /// Run to completion, streaming output into the log as it arrives.
    fn run_logged<'a>(&'a self, command: &'a str) -> RunFuture<'a, ExecutionResult> {
        Box::pin(async move {
            let mut handle = self.run(command)?;
            Ok(handle.follow(DEFAULT_POLL_INTERVAL).await?)
        })
    }

    /// Run to completion and hand back the full output.
    fn run_captured<'a>(
        &'a self,
        command: &'a str,
    ) -> RunFuture<'a, (ExecutionResult, OutputSnapshot)> {
        Box::pin(async move {
            let mut handle = self.run(command)?;
            let result = handle.wait().await?;
            Ok((result, handle.snapshot()))
        })
    }
}

/// Shared handle type used by steps and the pipeline.
pub type SharedDriver = Arc<dyn ExecutionDriver>;

#[derive(Debug)]
struct TrackedRun {
    exit: Arc<ExitSlot>,
    log: Arc<OutputLog>,
}

/// Bookkeeping for "last execution" queries.
#[derive(Debug, Default)]
pub struct RunTracker {
    last: Mutex<Option<TrackedRun>>,
    runs: AtomicU64,
}

impl RunTracker {
    pub fn track(&self, handle: &ProcessHandle) {
        let mut guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(TrackedRun {
            exit: handle.exit_slot(),
            log: handle.log(),
        });
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn last_result(&self) -> ExecutionResult {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .and_then(|run| run.exit.get())
            .unwrap_or_default()
    }

    pub fn last_output(&self) -> Option<OutputSnapshot> {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|run| run.log.snapshot())
    }

    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}
