// Run state (in-memory, one per shown shell)
//
// NOTE: `started`, `canceled` and `finished` are one-way latches. The controller mirrors them in
// atomics so the engine context can read them without taking the state lock; this struct is the
// snapshot handed to summary screens once the run is over.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub started: bool,
    pub canceled: bool,
    pub finished: bool,
    pub user_interrupted: bool,
    pub error_detected: bool,
    pub custom_error_text: Option<String>,
    pub errors: Vec<String>,
}

impl RunState {
    pub fn phase(&self, navigated: bool) -> ShellPhase {
        ShellPhase::from_latches(self.started, self.finished, navigated)
    }

    /// Terminal summary line, e.g. for an exit dialog.
    pub fn outcome(&self) -> RunOutcome {
        if self.error_detected {
            RunOutcome::Failed
        } else if self.user_interrupted || self.canceled {
            RunOutcome::Interrupted
        } else if self.finished {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellPhase {
    NotStarted,
    Navigating,
    Executing,
    Finished,
}

impl ShellPhase {
    pub fn from_latches(started: bool, finished: bool, navigated: bool) -> Self {
        if finished {
            ShellPhase::Finished
        } else if started {
            ShellPhase::Executing
        } else if navigated {
            ShellPhase::Navigating
        } else {
            ShellPhase::NotStarted
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShellPhase::NotStarted => "not_started",
            ShellPhase::Navigating => "navigating",
            ShellPhase::Executing => "executing",
            ShellPhase::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Pending,
    Succeeded,
    Interrupted,
    Failed,
}
