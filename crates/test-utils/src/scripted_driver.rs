use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ngspipe::driver::{CheckFuture, DirectShell, ExecutionDriver};
use ngspipe::errors::DriverError;
use ngspipe::exec::{ExecutionResult, OutputSnapshot, ProcessHandle};

/// A driver that:
/// - records every command it was asked to run
/// - replaces known commands with a scripted shell snippet
/// - runs everything else as `true`
///
/// Scripts run through a real [`DirectShell`], so exit codes and output
/// behave exactly like production.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    inner: DirectShell,
    scripts: HashMap<String, String>,
    prefix_scripts: Vec<(String, String)>,
    history: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `script` instead of exactly `command`.
    pub fn on(mut self, command: &str, script: &str) -> Self {
        self.scripts.insert(command.to_string(), script.to_string());
        self
    }

    /// Run `script` instead of any command starting with `prefix`.
    pub fn on_prefix(mut self, prefix: &str, script: &str) -> Self {
        self.prefix_scripts.push((prefix.to_string(), script.to_string()));
        self
    }

    /// Shared view of the commands run so far.
    pub fn history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.history)
    }

    fn script_for(&self, command: &str) -> &str {
        if let Some(script) = self.scripts.get(command) {
            return script;
        }
        self.prefix_scripts
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, script)| script.as_str())
            .unwrap_or("true")
    }
}

impl ExecutionDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&self, command: &str) -> Result<ProcessHandle, DriverError> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
        self.inner.run(self.script_for(command))
    }

    fn self_check(&self) -> CheckFuture<'_> {
        Box::pin(async { Ok(()) })
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
