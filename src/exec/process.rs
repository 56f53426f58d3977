// src/exec/process.rs

//! A single external process with captured stdout/stderr.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ProcessError;

use super::decode::{OutputEncoding, pump_lines};
use super::output::{LogCursor, OutputLine, OutputLog, OutputSnapshot, Source};

/// How long [`ProcessHandle::follow`] sleeps between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Exit status of a process run.
///
/// `exit_code == None` means the process never ran or has not finished yet
/// (or was killed by a signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn new(exit_code: Option<i32>) -> Self {
        Self { exit_code }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The exit code reinterpreted as the unsigned 32-bit value the OS
    /// reported. Windows tools report `0xFFFF_FFFF` which shows up as `-1`.
    pub fn unsigned_code(&self) -> Option<u32> {
        self.exit_code.map(|c| c as u32)
    }

    /// True for the "general failure" sentinel `0xFFFF_FFFF`.
    pub fn is_generic_failure(&self) -> bool {
        self.unsigned_code() == Some(GENERIC_FAILURE_CODE)
    }
}

/// Exit status the host distribution tool uses for several distinct errors.
pub const GENERIC_FAILURE_CODE: u32 = 0xFFFF_FFFF;

/// Exit code slot shared between a handle and whoever wants to observe it
/// (e.g. the driver that launched it).
#[derive(Debug, Default)]
pub struct ExitSlot {
    code: Mutex<Option<ExecutionResult>>,
}

impl ExitSlot {
    fn record(&self, result: ExecutionResult) {
        let mut guard = self.code.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(result);
    }

    /// `None` until the process has been observed to exit.
    pub fn get(&self) -> Option<ExecutionResult> {
        *self.code.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wraps one external process invocation.
///
/// `start()` spawns the program and two reader tasks (stdout, stderr) that
/// append decoded lines to a shared [`OutputLog`]. The caller can poll with
/// [`is_running`](Self::is_running) / [`read_available`](Self::read_available)
/// or await [`wait`](Self::wait), which also joins both readers so the log is
/// complete once it returns.
///
/// Must be started from within a Tokio runtime.
#[derive(Debug)]
pub struct ProcessHandle {
    program: OsString,
    args: Vec<OsString>,
    encoding: OutputEncoding,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    exit: Arc<ExitSlot>,
    log: Arc<OutputLog>,
    cursor: LogCursor,
    started: bool,
}

impl ProcessHandle {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let log = Arc::new(OutputLog::new());
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            encoding: OutputEncoding::default(),
            child: None,
            readers: Vec::with_capacity(2),
            exit: Arc::new(ExitSlot::default()),
            cursor: LogCursor::new(Arc::clone(&log)),
            log,
            started: false,
        }
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Human readable command line, used in logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Spawn the process and its two reader tasks.
    pub fn start(&mut self) -> Result<&mut Self, ProcessError> {
        if self.started {
            return Err(ProcessError::AlreadyStarted(self.command_line()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ProcessError::CannotStart {
            program: self.program_name(),
            source,
        })?;
        self.started = true;

        debug!(cmd = %self.command_line(), pid = ?child.id(), "process started");

        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(stdout, Source::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(stderr, Source::Stderr);
        }

        self.child = Some(child);
        Ok(self)
    }

    fn spawn_reader<R>(&mut self, pipe: R, source: Source)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let log = Arc::clone(&self.log);
        let encoding = self.encoding;
        let program = self.program_name();
        self.readers.push(tokio::spawn(async move {
            if let Err(e) = pump_lines(pipe, encoding, source, log).await {
                warn!(program = %program, ?source, error = %e, "reading process output failed");
            }
        }));
    }

    /// Non-blocking check. Records the exit code the first time the process
    /// is seen to have exited; repeated calls after that are no-ops.
    pub fn is_running(&mut self) -> bool {
        if self.exit.get().is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit.record(ExecutionResult::new(status.code()));
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(cmd = %self.command_line(), error = %e, "polling process failed");
                false
            }
        }
    }

    /// Wait for the process to exit and for both readers to drain their
    /// pipes.
    pub async fn wait(&mut self) -> Result<ExecutionResult, ProcessError> {
        if !self.started {
            return Err(ProcessError::NotStarted(self.command_line()));
        }

        if let Some(child) = self.child.as_mut() {
            if self.exit.get().is_none() {
                let status = child.wait().await.map_err(|source| ProcessError::Wait {
                    program: self.program.to_string_lossy().into_owned(),
                    source,
                })?;
                self.exit.record(ExecutionResult::new(status.code()));
            }
        }

        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!(error = %e, "output reader task failed");
            }
        }

        let result = self.result();
        debug!(cmd = %self.command_line(), exit_code = ?result.exit_code, "process finished");
        Ok(result)
    }

    /// Stream output into the tracing log while the process runs, then wait.
    ///
    /// Stdout lines are logged at `debug`, stderr lines at `warn`.
    pub async fn follow(&mut self, poll_interval: Duration) -> Result<ExecutionResult, ProcessError> {
        let program = self.program_name();
        while self.is_running() {
            log_lines(&program, self.read_available());
            tokio::time::sleep(poll_interval).await;
        }
        let result = self.wait().await?;
        log_lines(&program, self.read_available());
        info!(cmd = %self.command_line(), exit_code = ?result.exit_code, "command finished");
        Ok(result)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.get().and_then(|r| r.exit_code)
    }

    pub fn result(&self) -> ExecutionResult {
        self.exit.get().unwrap_or_default()
    }

    pub fn is_successful(&self) -> bool {
        self.result().success()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Lines that arrived since the previous call (own cursor). Never blocks.
    pub fn read_available(&mut self) -> Vec<OutputLine> {
        self.cursor.next_batch()
    }

    /// An independent streaming consumer starting at the first line.
    pub fn cursor(&self) -> LogCursor {
        LogCursor::new(Arc::clone(&self.log))
    }

    pub fn log(&self) -> Arc<OutputLog> {
        Arc::clone(&self.log)
    }

    pub(crate) fn exit_slot(&self) -> Arc<ExitSlot> {
        Arc::clone(&self.exit)
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        self.log.snapshot()
    }

    pub fn stdout(&self) -> OutputSnapshot {
        self.snapshot().stdout()
    }

    pub fn stderr(&self) -> OutputSnapshot {
        self.snapshot().stderr()
    }
}

fn log_lines(program: &str, lines: Vec<OutputLine>) {
    for line in lines {
        match line.source() {
            Source::Stdout => debug!(program, "stdout: {}", line.trimmed()),
            Source::Stderr => warn!(program, "stderr: {}", line.trimmed()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessHandle {
        ProcessHandle::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn splits_exactly_at_embedded_newline() {
        let mut p = sh("printf 'a\\nb'");
        p.start().unwrap();
        let result = p.wait().await.unwrap();

        assert!(result.success());
        assert_eq!(p.stdout().contents(), vec!["a\n", "b"]);
        assert!(p.stderr().is_empty());
    }

    #[tokio::test]
    async fn exit_code_is_propagated() {
        let mut p = sh("exit 123");
        p.start().unwrap();
        let result = p.wait().await.unwrap();

        assert_eq!(result.exit_code, Some(123));
        assert!(!result.success());
        assert_eq!(p.exit_code(), Some(123));
    }

    #[tokio::test]
    async fn stderr_is_tagged() {
        let mut p = sh("echo out; echo err 1>&2");
        p.start().unwrap();
        p.wait().await.unwrap();

        assert_eq!(p.stdout().contents(), vec!["out\n"]);
        assert_eq!(p.stderr().contents(), vec!["err\n"]);
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let mut p = ProcessHandle::new("definitely-not-a-real-program-xyz", Vec::<String>::new());
        match p.start() {
            Err(ProcessError::CannotStart { program, .. }) => {
                assert_eq!(program, "definitely-not-a-real-program-xyz");
            }
            other => panic!("expected CannotStart, got {other:?}"),
        }
        assert!(p.snapshot().is_empty());
        assert!(!p.is_running());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut p = sh("true");
        p.start().unwrap();
        assert!(matches!(p.start(), Err(ProcessError::AlreadyStarted(_))));
        p.wait().await.unwrap();
    }

    #[tokio::test]
    async fn wait_before_start_is_an_error() {
        let mut p = sh("true");
        assert!(matches!(p.wait().await, Err(ProcessError::NotStarted(_))));
        assert_eq!(p.result().exit_code, None);
    }

    #[tokio::test]
    async fn polling_after_drain_stays_empty() {
        let mut p = sh("echo one; echo two");
        p.start().unwrap();
        p.wait().await.unwrap();

        assert_eq!(p.read_available().len(), 2);
        for _ in 0..5 {
            assert!(p.read_available().is_empty());
            assert!(!p.is_running());
        }
        assert_eq!(p.exit_code(), Some(0));
    }

    #[test]
    fn sentinel_code_is_recognised() {
        let r = ExecutionResult::new(Some(-1));
        assert_eq!(r.unsigned_code(), Some(u32::MAX));
        assert!(r.is_generic_failure());
        assert!(!ExecutionResult::new(Some(1)).is_generic_failure());
        assert!(!ExecutionResult::default().success());
    }
}
