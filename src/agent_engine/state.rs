use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::action::model::{Action, GoalStatus};
use crate::errors::DeskPilotError;
use crate::perception::types::UIElement;

/// Lifecycle states of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Observing,
    Deciding,
    Acting,
    Settling,
    Summarizing,
    Terminal,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Observing => "observing",
            LoopState::Deciding => "deciding",
            LoopState::Acting => "acting",
            LoopState::Settling => "settling",
            LoopState::Summarizing => "summarizing",
            LoopState::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Immutable record of one completed step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub action: Action,
    pub reason: String,
    pub summary: String,
    pub before: Arc<RgbaImage>,
    pub after: Arc<RgbaImage>,
    pub elements: Vec<UIElement>,
    pub done: bool,
    pub raw_response: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// A step reported `done`. `goal_status` is set when it was a `status` action.
    Finished { goal_status: Option<GoalStatus> },
    StepBudgetExhausted,
    TimeLimitReached,
    Stopped,
    Failed(DeskPilotError),
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Finished { goal_status: Some(GoalStatus::Complete) } => "complete",
            RunOutcome::Finished { goal_status: Some(GoalStatus::Infeasible) } => "infeasible",
            RunOutcome::Finished { goal_status: None } => "finished",
            RunOutcome::StepBudgetExhausted => "step_budget_exhausted",
            RunOutcome::TimeLimitReached => "time_limit_reached",
            RunOutcome::Stopped => "stopped",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Failed(e) => write!(f, "failed: {e}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Everything a finished run produced, including the partial history of a
/// run that ended early.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub goal: String,
    pub steps: Vec<StepResult>,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// True only when the agent itself declared the run over and did not
    /// call the goal infeasible.
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::Finished {
                goal_status: None | Some(GoalStatus::Complete)
            }
        )
    }

    pub fn error(&self) -> Option<&DeskPilotError> {
        match &self.outcome {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}
