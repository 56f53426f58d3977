// src/pipeline/step.rs

//! Work steps and the per-step phase state machine.
//!
//! A step has four optional phases that run in order:
//! precheck → prepare → run → postcheck. Each phase returns a
//! [`PhaseOutcome`] instead of unwinding, and [`StepTracker`] (pure, no IO)
//! decides what happens next. [`execute_step`] is the async shell that
//! actually calls the phases.

use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::analysis::AnalysisFailure;
use crate::driver::SharedDriver;
use crate::errors::DriverError;
use crate::exec::ExecutionResult;

/// What a phase tells the pipeline.
#[derive(Debug)]
pub enum PhaseOutcome {
    /// Advance to the next phase.
    Continue,
    /// Nothing (more) to do: stop this step, count it as a success.
    SkipRest(String),
    /// Stop this step and abort the pipeline.
    Fail(StepFailure),
}

impl PhaseOutcome {
    /// `Continue` when `result` succeeded, `CommandFailed` otherwise.
    pub fn from_command(command: &str, result: ExecutionResult) -> Self {
        if result.success() {
            PhaseOutcome::Continue
        } else {
            PhaseOutcome::Fail(StepFailure::CommandFailed {
                command: command.to_string(),
                exit_code: result.exit_code,
            })
        }
    }
}

impl From<Result<(), StepFailure>> for PhaseOutcome {
    fn from(result: Result<(), StepFailure>) -> Self {
        match result {
            Ok(()) => PhaseOutcome::Continue,
            Err(failure) => PhaseOutcome::Fail(failure),
        }
    }
}

/// Why a step failed hard.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error("command `{command}` failed with exit code {exit_code:?}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisFailure),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("io error: {0}")]
    Io(String),
}

/// Boxed future returned by phase methods.
pub type PhaseFuture<'a> = Pin<Box<dyn Future<Output = PhaseOutcome> + Send + 'a>>;

/// A phase that does nothing.
pub fn skip_phase<'a>() -> PhaseFuture<'a> {
    Box::pin(ready(PhaseOutcome::Continue))
}

/// One stage of a pipeline.
///
/// Every phase is optional. Steps that drive commands expose their driver so
/// the pipeline can report its exit status and output.
pub trait WorkStep: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn driver(&self) -> Option<&SharedDriver> {
        None
    }

    /// Decide whether the step has work to do. The usual place for
    /// `SkipRest`.
    fn precheck(&mut self) -> PhaseFuture<'_> {
        skip_phase()
    }

    fn prepare(&mut self) -> PhaseFuture<'_> {
        skip_phase()
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        skip_phase()
    }

    /// Map the outcome of `run` to a failure category.
    fn postcheck(&mut self) -> PhaseFuture<'_> {
        skip_phase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Precheck,
    Prepare,
    Run,
    Postcheck,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Precheck, Phase::Prepare, Phase::Run, Phase::Postcheck];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Precheck => "precheck",
            Phase::Prepare => "prepare",
            Phase::Run => "run",
            Phase::Postcheck => "postcheck",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PhaseStatus {
    #[default]
    NotRun,
    Completed,
    Skipped(String),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhaseResults {
    pub precheck: PhaseStatus,
    pub prepare: PhaseStatus,
    pub run: PhaseStatus,
    pub postcheck: PhaseStatus,
}

impl PhaseResults {
    pub fn get(&self, phase: Phase) -> &PhaseStatus {
        match phase {
            Phase::Precheck => &self.precheck,
            Phase::Prepare => &self.prepare,
            Phase::Run => &self.run,
            Phase::Postcheck => &self.postcheck,
        }
    }

    fn set(&mut self, phase: Phase, status: PhaseStatus) {
        let slot = match phase {
            Phase::Precheck => &mut self.precheck,
            Phase::Prepare => &mut self.prepare,
            Phase::Run => &mut self.run,
            Phase::Postcheck => &mut self.postcheck,
        };
        *slot = status;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepState {
    #[default]
    NotStarted,
    Running,
    Done,
    SkippedSoft,
    FailedHard,
}

impl StepState {
    pub fn is_success(self) -> bool {
        matches!(self, StepState::Done | StepState::SkippedSoft)
    }
}

/// Progress of one executed step, as reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub step: String,
    pub state: StepState,
    pub return_code: i32,
    pub phases: PhaseResults,
}

impl StepReport {
    pub fn success(&self) -> bool {
        self.state.is_success()
    }
}

/// Pure state machine for one step's phases.
#[derive(Debug, Default)]
pub struct StepTracker {
    state: StepState,
    phases: PhaseResults,
    failure: Option<StepFailure>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn phases(&self) -> &PhaseResults {
        &self.phases
    }

    /// Record the outcome of `phase`. Returns `true` if the next phase
    /// should run.
    pub fn record(&mut self, phase: Phase, outcome: PhaseOutcome) -> bool {
        match outcome {
            PhaseOutcome::Continue => {
                self.phases.set(phase, PhaseStatus::Completed);
                self.state = if phase == Phase::Postcheck {
                    StepState::Done
                } else {
                    StepState::Running
                };
                self.state == StepState::Running
            }
            PhaseOutcome::SkipRest(reason) => {
                self.phases.set(phase, PhaseStatus::Skipped(reason));
                self.state = StepState::SkippedSoft;
                false
            }
            PhaseOutcome::Fail(failure) => {
                self.phases.set(phase, PhaseStatus::Failed);
                self.state = StepState::FailedHard;
                self.failure = Some(failure);
                false
            }
        }
    }

    /// Close the step. `driver_code` is the driver's last exit code if the
    /// driver launched anything while this step ran.
    pub fn finish(self, index: usize, step: &str, driver_code: Option<i32>) -> (StepReport, Option<StepFailure>) {
        let state = match self.state {
            StepState::NotStarted | StepState::Running => StepState::Done,
            other => other,
        };
        let report = StepReport {
            index,
            step: step.to_string(),
            state,
            return_code: return_code(state, driver_code),
            phases: self.phases,
        };
        (report, self.failure)
    }
}

/// Soft skips report 0. Otherwise the driver's code wins over the internal
/// one (`0` done, `-1` failed). A hard failure never reports 0.
pub fn return_code(state: StepState, driver_code: Option<i32>) -> i32 {
    match (state, driver_code) {
        (StepState::SkippedSoft, _) => 0,
        (StepState::FailedHard, Some(0)) => -1,
        (_, Some(code)) => code,
        (StepState::FailedHard, None) => -1,
        (_, None) => 0,
    }
}

/// Run all phases of `step` and report what happened.
pub async fn execute_step(
    step: &mut dyn WorkStep,
    index: usize,
) -> (StepReport, Option<StepFailure>) {
    let name = step.name().to_string();
    let runs_before = step.driver().map(|d| d.run_count());
    info!(step = %name, index, "step started");

    let mut tracker = StepTracker::new();
    for phase in Phase::ALL {
        let outcome = match phase {
            Phase::Precheck => step.precheck().await,
            Phase::Prepare => step.prepare().await,
            Phase::Run => step.run().await,
            Phase::Postcheck => step.postcheck().await,
        };
        match &outcome {
            PhaseOutcome::Continue => debug!(step = %name, %phase, "phase completed"),
            PhaseOutcome::SkipRest(reason) => {
                warn!(step = %name, %phase, %reason, "skipping rest of step")
            }
            PhaseOutcome::Fail(failure) => {
                error!(step = %name, %phase, error = %failure, "step failed")
            }
        }
        if !tracker.record(phase, outcome) {
            break;
        }
    }

    let driver_code = match (step.driver(), runs_before) {
        (Some(driver), Some(before)) if driver.run_count() > before => {
            driver.last_result().exit_code
        }
        _ => None,
    };

    let (report, failure) = tracker.finish(index, &name, driver_code);
    info!(step = %name, state = ?report.state, return_code = report.return_code, "step finished");
    (report, failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_continue_ends_done() {
        let mut t = StepTracker::new();
        for phase in Phase::ALL {
            assert_eq!(t.record(phase, PhaseOutcome::Continue), phase != Phase::Postcheck);
        }
        assert_eq!(t.state(), StepState::Done);
        let (report, failure) = t.finish(0, "a", None);
        assert_eq!(report.return_code, 0);
        assert!(failure.is_none());
        assert_eq!(report.phases.postcheck, PhaseStatus::Completed);
    }

    #[test]
    fn skip_in_precheck_leaves_later_phases_unrun() {
        let mut t = StepTracker::new();
        assert!(!t.record(Phase::Precheck, PhaseOutcome::SkipRest("no input".into())));
        let (report, failure) = t.finish(1, "gunzip", Some(1));

        assert_eq!(report.state, StepState::SkippedSoft);
        assert_eq!(report.return_code, 0);
        assert!(report.success());
        assert!(failure.is_none());
        assert_eq!(report.phases.precheck, PhaseStatus::Skipped("no input".into()));
        assert_eq!(report.phases.run, PhaseStatus::NotRun);
    }

    #[test]
    fn failure_keeps_the_category() {
        let mut t = StepTracker::new();
        t.record(Phase::Precheck, PhaseOutcome::Continue);
        t.record(Phase::Prepare, PhaseOutcome::Continue);
        t.record(Phase::Run, PhaseOutcome::Continue);
        t.record(
            Phase::Postcheck,
            PhaseOutcome::Fail(StepFailure::Analysis(AnalysisFailure::Incomplete)),
        );
        let (report, failure) = t.finish(2, "analysis", Some(2));
        assert_eq!(report.state, StepState::FailedHard);
        assert_eq!(report.return_code, 2);
        assert!(matches!(
            failure,
            Some(StepFailure::Analysis(AnalysisFailure::Incomplete))
        ));
    }

    #[test]
    fn return_code_rules() {
        assert_eq!(return_code(StepState::Done, None), 0);
        assert_eq!(return_code(StepState::FailedHard, None), -1);
        assert_eq!(return_code(StepState::Done, Some(0)), 0);
        assert_eq!(return_code(StepState::FailedHard, Some(123)), 123);
        assert_eq!(return_code(StepState::FailedHard, Some(0)), -1);
        assert_eq!(return_code(StepState::SkippedSoft, Some(123)), 0);
    }

    #[test]
    fn command_outcome() {
        assert!(matches!(
            PhaseOutcome::from_command("true", ExecutionResult::new(Some(0))),
            PhaseOutcome::Continue
        ));
        match PhaseOutcome::from_command("gunzip", ExecutionResult::new(Some(1))) {
            PhaseOutcome::Fail(StepFailure::CommandFailed { command, exit_code }) => {
                assert_eq!(command, "gunzip");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
