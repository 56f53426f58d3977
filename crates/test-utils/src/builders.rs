#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ngspipe::driver::SharedDriver;
use ngspipe::pipeline::{Phase, PhaseFuture, PhaseOutcome, StepFailure, WorkStep};

/// What a scripted phase does.
#[derive(Debug, Clone)]
pub enum ScriptedPhase {
    Continue,
    Skip(String),
    Fail(String),
    /// Run a command through the step's driver; non-zero fails the step.
    Command(String),
}

/// Builder for a [`ScriptedStep`].
pub struct ScriptedStepBuilder {
    name: String,
    driver: Option<SharedDriver>,
    phases: [ScriptedPhase; 4],
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: None,
            phases: [
                ScriptedPhase::Continue,
                ScriptedPhase::Continue,
                ScriptedPhase::Continue,
                ScriptedPhase::Continue,
            ],
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn driver(mut self, driver: SharedDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Shared `"<step>:<phase>"` log of every phase that was entered.
    pub fn journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = journal;
        self
    }

    pub fn phase(mut self, phase: Phase, behaviour: ScriptedPhase) -> Self {
        self.phases[phase_index(phase)] = behaviour;
        self
    }

    pub fn skip_at(self, phase: Phase, reason: &str) -> Self {
        self.phase(phase, ScriptedPhase::Skip(reason.to_string()))
    }

    pub fn fail_at(self, phase: Phase, reason: &str) -> Self {
        self.phase(phase, ScriptedPhase::Fail(reason.to_string()))
    }

    pub fn run_command(self, command: &str) -> Self {
        self.phase(Phase::Run, ScriptedPhase::Command(command.to_string()))
    }

    pub fn build(self) -> ScriptedStep {
        ScriptedStep {
            name: self.name,
            driver: self.driver,
            phases: self.phases,
            journal: self.journal,
        }
    }
}

fn phase_index(phase: Phase) -> usize {
    match phase {
        Phase::Precheck => 0,
        Phase::Prepare => 1,
        Phase::Run => 2,
        Phase::Postcheck => 3,
    }
}

/// A work step whose phases do what the test tells them.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    driver: Option<SharedDriver>,
    phases: [ScriptedPhase; 4],
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStep {
    fn play(&mut self, phase: Phase) -> PhaseFuture<'_> {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{}:{phase}", self.name));
        let behaviour = self.phases[phase_index(phase)].clone();
        Box::pin(async move {
            match behaviour {
                ScriptedPhase::Continue => PhaseOutcome::Continue,
                ScriptedPhase::Skip(reason) => PhaseOutcome::SkipRest(reason),
                ScriptedPhase::Fail(reason) => PhaseOutcome::Fail(StepFailure::Precondition(reason)),
                ScriptedPhase::Command(cmd) => match &self.driver {
                    None => PhaseOutcome::Fail(StepFailure::Precondition("no driver".to_string())),
                    Some(driver) => match driver.run_logged(&cmd).await {
                        Ok(result) => PhaseOutcome::from_command(&cmd, result),
                        Err(e) => PhaseOutcome::Fail(e.into()),
                    },
                },
            }
        })
    }
}

impl WorkStep for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> Option<&SharedDriver> {
        self.driver.as_ref()
    }

    fn precheck(&mut self) -> PhaseFuture<'_> {
        self.play(Phase::Precheck)
    }

    fn prepare(&mut self) -> PhaseFuture<'_> {
        self.play(Phase::Prepare)
    }

    fn run(&mut self) -> PhaseFuture<'_> {
        self.play(Phase::Run)
    }

    fn postcheck(&mut self) -> PhaseFuture<'_> {
        self.play(Phase::Postcheck)
    }
}
