// src/pipeline/mod.rs

//! Sequential execution of work steps.
//!
//! Steps run strictly in the order they were added, one at a time. A soft
//! skip is absorbed by the step and the pipeline moves on; a hard failure
//! stops the pipeline and is returned together with the failing step's
//! output.

pub mod status;
pub mod step;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::exec::OutputSnapshot;

pub use status::{StatusMonitor, StatusUpdate};
pub use step::{
    Phase, PhaseFuture, PhaseOutcome, PhaseResults, PhaseStatus, StepFailure, StepReport,
    StepState, StepTracker, WorkStep, execute_step, skip_phase,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("step '{step}' failed: {failure}")]
    StepFailed {
        step: String,
        #[source]
        failure: StepFailure,
        /// Output of the failing step's last command, if it ran one.
        output: Option<OutputSnapshot>,
    },

    #[error("pipeline was already executed")]
    AlreadyExecuted,

    #[error("pipeline task ended abnormally: {0}")]
    Aborted(String),
}

/// Result of a pipeline that ran to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub reports: Vec<StepReport>,
    /// Return code of the last step; `None` for an empty pipeline.
    pub return_code: Option<i32>,
}

/// Ordered list of work steps.
#[derive(Debug, Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn WorkStep>>,
    finished: bool,
    last_return_code: Option<i32>,
    reports: Option<mpsc::UnboundedSender<StepReport>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_work<S>(&mut self, step: S) -> &mut Self
    where
        S: WorkStep + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn add_boxed(&mut self, step: Box<dyn WorkStep>) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// True once every step ran or a hard failure stopped the pipeline.
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn return_code(&self) -> Option<i32> {
        self.last_return_code
    }

    /// Run all steps in order. May be called once.
    pub async fn execute(&mut self) -> Result<PipelineSummary, PipelineError> {
        if self.finished {
            return Err(PipelineError::AlreadyExecuted);
        }
        info!(steps = self.steps.len(), "pipeline started");

        let mut reports = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter_mut().enumerate() {
            let (report, failure) = execute_step(step.as_mut(), index).await;
            self.last_return_code = Some(report.return_code);

            if let Some(tx) = &self.reports {
                // Nobody listening is fine.
                let _ = tx.send(report.clone());
            }
            reports.push(report);

            if let Some(failure) = failure {
                self.finished = true;
                let output = step.driver().and_then(|d| d.last_output());
                error!(step = step.name(), return_code = ?self.last_return_code, "pipeline aborted");
                return Err(PipelineError::StepFailed {
                    step: step.name().to_string(),
                    failure,
                    output,
                });
            }
        }

        self.finished = true;
        debug!(return_code = ?self.last_return_code, "pipeline finished");
        Ok(PipelineSummary {
            reports,
            return_code: self.last_return_code,
        })
    }

    /// Run the pipeline on its own task, reporting each step as it ends.
    pub fn spawn(mut self) -> PipelineRun {
        let (tx, rx) = mpsc::unbounded_channel();
        self.reports = Some(tx);
        let handle = tokio::spawn(async move { self.execute().await });
        PipelineRun { reports: rx, handle }
    }
}

/// A pipeline running in the background.
#[derive(Debug)]
pub struct PipelineRun {
    reports: mpsc::UnboundedReceiver<StepReport>,
    handle: JoinHandle<Result<PipelineSummary, PipelineError>>,
}

impl PipelineRun {
    /// Next finished step; `None` once the pipeline is over and every
    /// report was consumed.
    pub async fn next_report(&mut self) -> Option<StepReport> {
        self.reports.recv().await
    }

    /// Non-blocking variant of [`next_report`](Self::next_report).
    pub fn try_next_report(&mut self) -> Option<StepReport> {
        self.reports.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn finish(self) -> Result<PipelineSummary, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))?
    }
}
