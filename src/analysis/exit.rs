// src/analysis/exit.rs

use thiserror::Error;

/// Failure categories reported by the in-environment analysis runner
/// through its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    #[error("analysis aborted")]
    Aborted,

    #[error("analysis incomplete")]
    Incomplete,

    #[error("analysis failed")]
    Failed,

    #[error("system error during analysis")]
    SystemError,

    #[error("uncaught error in analysis (exit code {0})")]
    Uncaught(i32),
}

impl AnalysisFailure {
    /// `None` for a successful run. An absent code (process never finished)
    /// is treated as uncaught with `-1`.
    pub fn from_exit_code(code: Option<i32>) -> Option<Self> {
        match code {
            Some(0) => None,
            Some(1) => Some(AnalysisFailure::Aborted),
            Some(2) => Some(AnalysisFailure::Incomplete),
            Some(3) => Some(AnalysisFailure::Failed),
            Some(4) => Some(AnalysisFailure::SystemError),
            Some(other) => Some(AnalysisFailure::Uncaught(other)),
            None => Some(AnalysisFailure::Uncaught(-1)),
        }
    }
}
