use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::action::parser::parse_response;
use crate::action::wire::encode_action;
use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::agent_engine::history::History;
use crate::agent_engine::loop_control::{LoopController, StopSignal};
use crate::agent_engine::prompts::{build_decision_prompt, build_summary_prompt};
use crate::agent_engine::state::{LoopState, RunOutcome, RunReport, StepResult};
use crate::config::AgentConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::dispatcher::ActionExecutor;
use crate::llm::provider::DecisionPort;
use crate::perception::traits::PerceptionPort;

/// Loop-level knobs, usually taken from `[agent]`.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_steps: u32,
    pub max_duration: Option<Duration>,
    pub settle: Duration,
    pub strict_action_block: bool,
    pub guidelines: String,
}

impl From<&AgentConfig> for LoopSettings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            max_steps: cfg.max_steps,
            max_duration: cfg
                .max_duration_minutes
                .map(|m| Duration::from_secs(u64::from(m) * 60)),
            settle: Duration::from_millis(cfg.settle_ms),
            strict_action_block: cfg.strict_action_block,
            guidelines: cfg.guidelines.clone(),
        }
    }
}

/// Goal and history of the current run. Cleared on reset.
#[derive(Debug, Default)]
struct RunState {
    goal: String,
    history: History,
}

/// The perceive-decide-act loop.
pub struct AgentLoop {
    perception: Arc<dyn PerceptionPort>,
    decision: Arc<dyn DecisionPort>,
    summarizer: Arc<dyn DecisionPort>,
    executor: ActionExecutor,
    settings: LoopSettings,
    state: LoopState,
    run: RunState,
    events: Option<EventBus>,
    stop: StopSignal,
}

impl AgentLoop {
    pub fn new(
        perception: Arc<dyn PerceptionPort>,
        decision: Arc<dyn DecisionPort>,
        summarizer: Arc<dyn DecisionPort>,
        executor: ActionExecutor,
        settings: LoopSettings,
    ) -> Self {
        Self {
            perception,
            decision,
            summarizer,
            executor,
            settings,
            state: LoopState::Idle,
            run: RunState::default(),
            events: None,
            stop: StopSignal::never(),
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn goal(&self) -> &str {
        &self.run.goal
    }

    pub fn history(&self) -> &History {
        &self.run.history
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Back to `Idle` with no goal and an empty history.
    pub fn reset(&mut self) {
        self.run = RunState::default();
        self.set_state(LoopState::Idle);
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "loop state");
        }
        self.state = state;
        self.emit(AgentEvent::StateChanged { state });
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Perform one full observe-decide-act-settle-summarize iteration and
    /// append it to the history. An error leaves the loop `Terminal`.
    pub async fn step(&mut self, goal: &str) -> DeskPilotResult<&StepResult> {
        if self.run.goal != goal {
            self.run.goal = goal.to_string();
        }
        if let Err(e) = self.step_inner().await {
            tracing::error!(error = %e, step_local = e.is_step_local(), "step failed");
            self.set_state(LoopState::Terminal);
            return Err(e);
        }
        self.run
            .history
            .last()
            .ok_or_else(|| DeskPilotError::Decision("step produced no history entry".into()))
    }

    async fn step_inner(&mut self) -> DeskPilotResult<()> {
        let step_no = self.run.history.len() + 1;
        let screen = self.executor.screen();

        self.set_state(LoopState::Observing);
        let before = Arc::new(self.executor.coords().screenshot(Some(screen), None).await?);
        let perception = self.perception.parse(&before).await?;
        tracing::info!(step = step_no, screen, elements = perception.elements.len(), "screen observed");

        self.set_state(LoopState::Deciding);
        let prompt = build_decision_prompt(
            &self.run.goal,
            &self.run.history.digest(),
            &perception.elements,
            screen,
            &self.settings.guidelines,
        );
        let prediction = self.decision.predict(&prompt, &[&perception.labeled_image]).await?;
        tracing::trace!(raw = %prediction.raw, "decision raw payload");
        let parsed = parse_response(&prediction.text, self.settings.strict_action_block)?;
        let mut action = parsed.action;
        tracing::info!(
            step = step_no,
            action = action.action_type(),
            reason = %parsed.reason,
            "action chosen"
        );

        self.set_state(LoopState::Acting);
        let should_continue = self.executor.execute(&mut action, &perception.elements).await?;

        self.set_state(LoopState::Settling);
        tokio::time::sleep(self.settings.settle).await;
        let after = Arc::new(self.executor.coords().screenshot(Some(screen), None).await?);

        self.set_state(LoopState::Summarizing);
        let action_json = encode_action(&action);
        let summary_prompt = build_summary_prompt(&action_json.to_string(), &parsed.reason);
        let summary = self
            .summarizer
            .predict(&summary_prompt, &[before.as_ref(), after.as_ref()])
            .await?
            .text
            .trim()
            .to_string();
        tracing::info!(step = step_no, summary = %summary, "step summarized");

        let done = !should_continue || action.is_status();
        self.emit(AgentEvent::StepCompleted {
            step: step_no,
            action: action_json,
            reason: parsed.reason.clone(),
            summary: summary.clone(),
            done,
        });
        self.run.history.push(StepResult {
            action,
            reason: parsed.reason,
            summary,
            before,
            after,
            elements: perception.elements,
            done,
            raw_response: prediction.text,
            timestamp: chrono::Utc::now(),
        });
        self.set_state(if done { LoopState::Terminal } else { LoopState::Observing });
        Ok(())
    }

    /// Run toward `goal` until a step is done, a limit is hit, stop is
    /// requested, or a step fails. `max_steps` overrides the configured budget.
    pub async fn run(&mut self, goal: &str, max_steps: Option<u32>) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        let outcome = self.run_inner(goal, max_steps).instrument(span).await;

        if let RunOutcome::Failed(e) = &outcome {
            tracing::error!(run_id = %run_id, error = %e, "run aborted");
        } else {
            tracing::info!(run_id = %run_id, outcome = %outcome, steps = self.run.history.len(), "run finished");
        }
        self.set_state(LoopState::Terminal);
        self.emit(AgentEvent::RunFinished {
            run_id: run_id.clone(),
            outcome: outcome.as_str().to_string(),
            steps: self.run.history.len(),
            error: match &outcome {
                RunOutcome::Failed(e) => Some(e.to_string()),
                _ => None,
            },
        });

        RunReport {
            run_id,
            goal: goal.to_string(),
            steps: self.run.history.steps().to_vec(),
            outcome,
        }
    }

    async fn run_inner(&mut self, goal: &str, max_steps: Option<u32>) -> RunOutcome {
        self.reset();
        self.run.goal = goal.to_string();
        let budget = max_steps.unwrap_or(self.settings.max_steps);
        let controller = LoopController::new(budget, self.settings.max_duration, self.stop.clone());
        tracing::info!(goal = %goal, max_steps = budget, screen = self.executor.screen(), "run started");

        loop {
            if let Some(outcome) = controller.should_stop(self.run.history.len()) {
                return outcome;
            }
            match self.step(goal).await {
                Ok(step) if step.done => {
                    return RunOutcome::Finished {
                        goal_status: step.action.goal_status(),
                    }
                }
                Ok(_) => {}
                Err(e) => return RunOutcome::Failed(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::model::{ActionKind, GoalStatus, Target};
    use crate::agent_engine::loop_control::stop_channel;
    use crate::executor::coordinator::CoordinateSystem;
    use crate::executor::dispatcher::ExecutorTiming;
    use crate::executor::input::MouseButton;
    use crate::test_support::{
        element, FailingPerception, FakeScreen, FixedPerception, ImmediateOperator, InputEvent,
        RecordingInput, ScriptedDecision,
    };

    struct Harness {
        agent: AgentLoop,
        input: Arc<RecordingInput>,
        screen: Arc<FakeScreen>,
        decision: Arc<ScriptedDecision>,
        summarizer: Arc<ScriptedDecision>,
    }

    fn harness(screen_id: u32, replies: &[&str]) -> Harness {
        let perception = Arc::new(FixedPerception::new(vec![
            element(0, 100, 100),
            element(2, 500, 400),
        ]));
        harness_with(screen_id, replies, perception)
    }

    fn harness_with(screen_id: u32, replies: &[&str], perception: Arc<dyn PerceptionPort>) -> Harness {
        let screen = Arc::new(FakeScreen::dual());
        let input = Arc::new(RecordingInput::new());
        let decision = Arc::new(ScriptedDecision::new(replies));
        let summarizer = Arc::new(ScriptedDecision::repeating("Did the thing."));
        let executor = ActionExecutor::new(
            CoordinateSystem::new(screen.clone()),
            input.clone(),
            screen_id,
            ExecutorTiming::immediate(),
        )
        .with_operator(Arc::new(ImmediateOperator::new("blue")));
        let settings = LoopSettings {
            max_steps: 10,
            max_duration: None,
            settle: Duration::ZERO,
            strict_action_block: false,
            guidelines: String::new(),
        };
        let agent = AgentLoop::new(perception, decision.clone(), summarizer.clone(), executor, settings);
        Harness {
            agent,
            input,
            screen,
            decision,
            summarizer,
        }
    }

    #[tokio::test]
    async fn click_on_element_two_lands_on_monitor_offset() {
        let mut h = harness(1, &["Reason: Settings is element 2.\nAction: {\"action_type\": \"click\", \"index\": 2}"]);
        let step = h.agent.step("Open Settings").await.unwrap();
        assert!(!step.done);
        assert_eq!(step.reason, "Settings is element 2.");
        assert_eq!(step.summary, "Did the thing.");
        assert_eq!(step.action.kind, ActionKind::Click(Target::index(2)));
        // Monitor 1 origin is (1920, -200).
        assert_eq!(
            h.input.events(),
            vec![InputEvent::Move(2420, 200), InputEvent::Click(MouseButton::Left, 1)]
        );
        // Before and after captures, both of monitor 1.
        assert_eq!(h.screen.captured().len(), 2);
        assert!(h.screen.captured().iter().all(|r| (r.x, r.y) == (1920, -200)));
        assert_eq!(h.agent.state(), LoopState::Observing);
        assert_eq!(h.agent.history().len(), 1);
    }

    #[tokio::test]
    async fn decision_prompt_includes_goal_screen_and_elements() {
        let mut h = harness(0, &["Action: {\"action_type\": \"wait\"}"]);
        h.agent.step("Find the clock").await.unwrap();
        let prompts = h.decision.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("CURRENT GOAL: Find the clock"));
        assert!(prompts[0].contains("operating on screen 0"));
        assert!(prompts[0].contains("Element 2: type=icon"));
        assert!(prompts[0].contains("(No actions taken yet)"));
        assert_eq!(h.decision.image_counts(), vec![1]);
        assert_eq!(h.summarizer.image_counts(), vec![2]);
    }

    #[tokio::test]
    async fn status_complete_ends_run_regardless_of_budget() {
        let mut h = harness(0, &[
            "Reason: one\nAction: {\"action_type\": \"wait\"}",
            "Reason: done\nAction: {\"action_type\": \"status\", \"goal_status\": \"complete\"}",
            "Action: {\"action_type\": \"wait\"}",
        ]);
        let report = h.agent.run("Do it", Some(10)).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Finished { goal_status: Some(GoalStatus::Complete) }
        ));
        assert!(report.is_success());
        assert_eq!(report.steps.len(), 2);
        assert!(!report.steps[0].done);
        assert!(report.steps[1].done);
        assert_eq!(h.decision.prompts().len(), 2);
        assert_eq!(h.agent.state(), LoopState::Terminal);
    }

    #[tokio::test]
    async fn answer_is_terminal() {
        let mut h = harness(0, &["Reason: known\nAction: {\"action_type\": \"answer\", \"text\": \"Paris\"}"]);
        let report = h.agent.run("Capital of France?", None).await;
        assert!(matches!(report.outcome, RunOutcome::Finished { goal_status: None }));
        assert_eq!(report.steps.len(), 1);
        assert!(h.input.events().is_empty());
    }

    #[tokio::test]
    async fn ask_user_reply_reaches_next_prompt() {
        let mut h = harness(0, &[
            "Reason: unclear\nAction: {\"action_type\": \"ask_user\", \"question\": \"Which color?\"}",
            "Reason: ok\nAction: {\"action_type\": \"status\", \"goal_status\": \"complete\"}",
        ]);
        let report = h.agent.run("Pick a color", None).await;
        assert!(report.is_success());
        assert_eq!(report.steps[0].action.user_response(), Some("blue"));
        assert!(h.decision.prompts()[1].contains("[User responded: blue]"));
    }

    #[tokio::test]
    async fn step_budget_exhaustion_is_reported_not_failed() {
        let mut h = harness(0, &["Action: {\"action_type\": \"wait\"}"; 3]);
        let report = h.agent.run("Wait forever", Some(2)).await;
        assert!(matches!(report.outcome, RunOutcome::StepBudgetExhausted));
        assert!(report.error().is_none());
        assert_eq!(report.steps.len(), 2);
    }

    #[tokio::test]
    async fn malformed_response_aborts_with_partial_history() {
        let mut h = harness(0, &[
            "Reason: first\nAction: {\"action_type\": \"wait\"}",
            "I have no idea what to do.",
        ]);
        let report = h.agent.run("Confuse the model", None).await;
        assert!(matches!(report.outcome, RunOutcome::Failed(DeskPilotError::MalformedResponse(_))));
        assert!(!report.is_success());
        assert_eq!(report.steps.len(), 1);
        assert_eq!(h.agent.state(), LoopState::Terminal);
    }

    #[tokio::test]
    async fn perception_failure_fails_the_run_before_deciding() {
        let mut h = harness_with(0, &["Action: {\"action_type\": \"wait\"}"], Arc::new(FailingPerception));
        let report = h.agent.run("Look around", None).await;
        assert!(matches!(report.outcome, RunOutcome::Failed(DeskPilotError::Perception(_))));
        assert!(!report.is_success());
        assert!(report.steps.is_empty());
        assert!(h.decision.prompts().is_empty());
        assert!(h.input.events().is_empty());
        assert_eq!(h.agent.state(), LoopState::Terminal);
    }

    #[tokio::test]
    async fn decision_failure_keeps_earlier_steps() {
        // One scripted reply, so the second prediction fails.
        let mut h = harness(0, &["Reason: first\nAction: {\"action_type\": \"click\", \"index\": 0}"]);
        let report = h.agent.run("Click twice", None).await;
        assert!(matches!(report.outcome, RunOutcome::Failed(DeskPilotError::Decision(_))));
        assert!(!report.is_success());
        assert!(report.error().is_some());
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].reason, "first");
        assert_eq!(h.decision.prompts().len(), 2);
        assert_eq!(h.input.events().len(), 2);
        assert_eq!(h.agent.state(), LoopState::Terminal);
    }

    #[tokio::test]
    async fn invalid_index_aborts_before_any_input() {
        let mut h = harness(0, &["Action: {\"action_type\": \"click\", \"index\": 1}"]);
        let err = h.agent.step("Click a ghost").await.unwrap_err();
        assert!(matches!(err, DeskPilotError::InvalidIndex { index: 1, .. }));
        assert!(h.input.events().is_empty());
        assert!(h.agent.history().is_empty());
    }

    #[tokio::test]
    async fn stop_before_first_step_ends_run_immediately() {
        let (handle, signal) = stop_channel();
        let mut h = harness(0, &["Action: {\"action_type\": \"wait\"}"]);
        h.agent = h.agent.with_stop(signal);
        handle.stop();
        let report = h.agent.run("Anything", None).await;
        assert!(matches!(report.outcome, RunOutcome::Stopped));
        assert!(report.steps.is_empty());
        assert!(h.decision.prompts().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_goal_and_history() {
        let mut h = harness(0, &["Action: {\"action_type\": \"wait\"}"]);
        h.agent.step("Look around").await.unwrap();
        assert_eq!(h.agent.goal(), "Look around");
        h.agent.reset();
        assert_eq!(h.agent.goal(), "");
        assert!(h.agent.history().is_empty());
        assert_eq!(h.agent.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn events_trace_the_state_machine() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut h = harness(0, &["Action: {\"action_type\": \"status\", \"goal_status\": \"infeasible\"}"]);
        h.agent = h.agent.with_events(bus);
        let report = h.agent.run("Impossible", None).await;
        assert!(!report.is_success());

        let mut states = Vec::new();
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::StateChanged { state } => states.push(state),
                AgentEvent::RunFinished { outcome, .. } => finished = Some(outcome),
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                LoopState::Idle,
                LoopState::Observing,
                LoopState::Deciding,
                LoopState::Acting,
                LoopState::Settling,
                LoopState::Summarizing,
                LoopState::Terminal,
                LoopState::Terminal,
            ]
        );
        assert_eq!(finished.as_deref(), Some("infeasible"));
    }
}
