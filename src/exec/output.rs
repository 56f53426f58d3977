// src/exec/output.rs

//! Output line log shared between a process' reader tasks and its consumers.
//!
//! The log is an append-only `Vec` behind an `RwLock`. Streaming consumers
//! hold a [`LogCursor`] (an index into the log) and fetch whatever arrived
//! since their last call; snapshot consumers copy the whole log at a point in
//! time.

use std::fmt;
use std::sync::{Arc, RwLock};

const RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0;0m";

/// Which pipe a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Stdout,
    Stderr,
}

/// One decoded line of process output.
///
/// `content` keeps the trailing newline if the process wrote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    content: String,
    source: Source,
}

impl OutputLine {
    pub fn new(content: impl Into<String>, source: Source) -> Self {
        Self {
            content: content.into(),
            source,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_stdout(&self) -> bool {
        self.source == Source::Stdout
    }

    pub fn is_stderr(&self) -> bool {
        self.source == Source::Stderr
    }

    /// Content with any trailing `\r\n` / `\n` removed.
    pub fn trimmed(&self) -> &str {
        self.content.trim_end_matches(['\r', '\n'])
    }

    /// Terminal rendering: stderr lines are wrapped in red.
    pub fn pretty(&self) -> String {
        match self.source {
            Source::Stderr => format!("{RED}{}{RESET}", self.content),
            Source::Stdout => self.content.clone(),
        }
    }
}

/// Append-only, thread-safe log of output lines.
#[derive(Debug, Default)]
pub struct OutputLog {
    lines: RwLock<Vec<OutputLine>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line. Only a process' reader tasks call this.
    pub(crate) fn append(&self, line: OutputLine) {
        // A poisoned lock only means a reader panicked mid-append; the Vec is
        // still valid.
        let mut guard = self.lines.write().unwrap_or_else(|e| e.into_inner());
        guard.push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines at index `from` and later. Empty if nothing new.
    pub fn read_from(&self, from: usize) -> Vec<OutputLine> {
        let guard = self.lines.read().unwrap_or_else(|e| e.into_inner());
        guard.get(from..).map(<[OutputLine]>::to_vec).unwrap_or_default()
    }

    /// Copy of the whole log as it is right now.
    pub fn snapshot(&self) -> OutputSnapshot {
        OutputSnapshot::new(self.read_from(0))
    }
}

/// Per-consumer read position into an [`OutputLog`].
#[derive(Debug, Clone)]
pub struct LogCursor {
    log: Arc<OutputLog>,
    position: usize,
}

impl LogCursor {
    pub fn new(log: Arc<OutputLog>) -> Self {
        Self { log, position: 0 }
    }

    /// Non-blocking: everything appended since the previous call.
    pub fn next_batch(&mut self) -> Vec<OutputLine> {
        let batch = self.log.read_from(self.position);
        self.position += batch.len();
        batch
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// Immutable, ordered copy of a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    lines: Vec<OutputLine>,
}

impl OutputSnapshot {
    pub fn new(lines: Vec<OutputLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn stdout(&self) -> OutputSnapshot {
        self.filtered(Source::Stdout)
    }

    pub fn stderr(&self) -> OutputSnapshot {
        self.filtered(Source::Stderr)
    }

    /// Raw line contents, in order.
    pub fn contents(&self) -> Vec<&str> {
        self.lines.iter().map(OutputLine::content).collect()
    }

    /// All lines concatenated.
    pub fn text(&self) -> String {
        self.lines.iter().map(OutputLine::content).collect()
    }

    /// Concatenation with stderr lines highlighted.
    pub fn pretty(&self) -> String {
        self.lines.iter().map(OutputLine::pretty).collect()
    }

    fn filtered(&self, source: Source) -> OutputSnapshot {
        OutputSnapshot::new(
            self.lines
                .iter()
                .filter(|l| l.source == source)
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for OutputSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl<'a> IntoIterator for &'a OutputSnapshot {
    type Item = &'a OutputLine;
    type IntoIter = std::slice::Iter<'a, OutputLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
