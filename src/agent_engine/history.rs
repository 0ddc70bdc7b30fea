use crate::agent_engine::state::StepResult;

/// Ordered, append-only record of a run's steps. Lives only as long as the run.
#[derive(Debug, Default, Clone)]
pub struct History {
    steps: Vec<StepResult>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: StepResult) {
        tracing::debug!(step = self.steps.len() + 1, action = step.action.action_type(), "history entry appended");
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&StepResult> {
        self.steps.last()
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// One line per step for the decision prompt, including any operator
    /// reply to an `ask_user` step.
    pub fn digest(&self) -> String {
        if self.steps.is_empty() {
            return "(No actions taken yet)".to_string();
        }
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let mut line = format!("Step {}: {}", i + 1, step.summary);
                if let Some(reply) = step.action.user_response().filter(|r| !r.is_empty()) {
                    line.push_str(&format!(" [User responded: {reply}]"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
