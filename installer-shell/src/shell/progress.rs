// Progress accumulation
//
// Folds the engine's typed progress records into a single fraction in [0, 1]. The engine runs in
// two coarse passes (script generation, then script execution); each master reset starts the
// next pass. The first pass contributes `weight` of the bar, the second the remainder.
//
// Progress record layout (field 1 selects the subtype):
//   0  master reset      [2] total ticks, [3] direction (0 = forward), [4] event type
//   1  action info       [2] ticks per ActionData message, [3] 0 = ignore ActionData
//   2  progress report   [2] ticks moved
//   3  total addition    [2] extra ticks

use crate::models::message::{InstallMessage, MessageRecord};

pub const DEFAULT_PROGRESS_WEIGHT: f64 = 0.5;

/// The engine undercounts the planning pass by roughly this many ticks.
const SCRIPT_PLANNING_SLACK_TICKS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// No master reset seen yet.
    Idle,
    /// Script generation pass (first reset).
    ScriptInProgress,
    /// Script execution pass (second reset).
    Executing,
    /// Any further reset; the bar is reported full.
    Complete,
}

impl ProgressPhase {
    fn advance(self) -> Self {
        match self {
            ProgressPhase::Idle => ProgressPhase::ScriptInProgress,
            ProgressPhase::ScriptInProgress => ProgressPhase::Executing,
            ProgressPhase::Executing | ProgressPhase::Complete => ProgressPhase::Complete,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressAccumulator {
    weight: f64,
    phase: ProgressPhase,
    total: i64,
    completed: i64,
    forward: bool,
    action_data_step: Option<i64>,
    progress: f64,
}

impl Default for ProgressAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_WEIGHT)
    }
}

impl ProgressAccumulator {
    /// `weight` outside (0, 1] falls back to the default.
    pub fn new(weight: f64) -> Self {
        let weight = if weight > 0.0 && weight <= 1.0 {
            weight
        } else {
            DEFAULT_PROGRESS_WEIGHT
        };
        Self {
            weight,
            phase: ProgressPhase::Idle,
            total: 0,
            completed: 0,
            forward: true,
            action_data_step: None,
            progress: 0.0,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn percent(&self) -> u8 {
        (self.progress * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Never fails; records that do not carry the expected fields are ignored.
    pub fn process_message(&mut self, kind: InstallMessage, record: &MessageRecord) {
        match kind {
            InstallMessage::ActionStart => {
                self.action_data_step = None;
            }
            InstallMessage::ActionData => {
                if let Some(step) = self.action_data_step {
                    self.advance_ticks(step);
                }
            }
            InstallMessage::Progress => self.process_progress_record(record),
            _ => {}
        }
    }

    fn process_progress_record(&mut self, record: &MessageRecord) {
        let Some(subtype) = record.integer(1) else {
            return;
        };

        match subtype {
            0 => {
                if record.field_count() < 4 {
                    return;
                }
                let Some(total) = record.integer(2) else {
                    return;
                };
                let Some(direction) = record.integer(3) else {
                    return;
                };

                self.phase = self.phase.advance();
                self.total = total.max(0);
                if self.phase == ProgressPhase::ScriptInProgress {
                    self.total += SCRIPT_PLANNING_SLACK_TICKS;
                }
                self.forward = direction == 0;
                self.completed = if self.forward { 0 } else { self.total };
                self.action_data_step = None;
                self.recompute(true);
            }
            1 => {
                if record.field_count() < 3 {
                    return;
                }
                match (record.integer(2), record.integer(3)) {
                    (_, Some(0)) => self.action_data_step = None,
                    (Some(step), Some(_)) => self.action_data_step = Some(step),
                    _ => {}
                }
            }
            2 => {
                if self.phase == ProgressPhase::Idle || self.total == 0 {
                    return;
                }
                if let Some(ticks) = record.integer(2) {
                    self.advance_ticks(ticks);
                }
            }
            3 => {
                if let Some(extra) = record.integer(2) {
                    self.total = self.total.saturating_add(extra).max(0);
                }
            }
            _ => {}
        }
    }

    fn advance_ticks(&mut self, ticks: i64) {
        if self.forward {
            self.completed = self.completed.saturating_add(ticks);
        } else {
            self.completed = self.completed.saturating_sub(ticks);
        }
        self.recompute(false);
    }

    /// Within a pass the reported value only moves up; a master reset may move it anywhere.
    fn recompute(&mut self, reset: bool) {
        if self.phase == ProgressPhase::Idle {
            return;
        }
        if self.phase != ProgressPhase::Complete && self.total == 0 {
            return;
        }

        let ratio = if self.total == 0 {
            1.0
        } else {
            (self.completed as f64 / self.total as f64).clamp(0.0, 1.0)
        };

        let value = match self.phase {
            ProgressPhase::Idle => return,
            ProgressPhase::ScriptInProgress => self.weight * ratio,
            ProgressPhase::Executing => self.weight + (1.0 - self.weight) * ratio,
            ProgressPhase::Complete => 1.0,
        };

        self.progress = if reset {
            value
        } else {
            self.progress.max(value)
        };
    }
}
