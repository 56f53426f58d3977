// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running external programs, using
//! `tokio::process::Command`, and capturing what they print.
//!
//! - [`output`] holds the append-only output line log plus its cursor and
//!   snapshot views.
//! - [`decode`] turns raw pipe bytes into lines (UTF-8 or UTF-16LE).
//! - [`process`] owns the [`ProcessHandle`]: one OS process and the two
//!   reader tasks pumping its stdout/stderr into the log.

pub mod decode;
pub mod output;
pub mod process;

pub use decode::OutputEncoding;
pub use output::{LogCursor, OutputLine, OutputLog, OutputSnapshot, Source};
pub use process::{
    DEFAULT_POLL_INTERVAL, ExecutionResult, ExitSlot, GENERIC_FAILURE_CODE, ProcessHandle,
};
