use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::agent_engine::operator::Operator;
use crate::agent_engine::state::LoopState;
use crate::errors::DeskPilotResult;

/// Progress notifications for front ends. Payloads are plain data; screenshots
/// stay in the run report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged {
        state: LoopState,
    },
    StepCompleted {
        step: usize,
        action: serde_json::Value,
        reason: String,
        summary: String,
        done: bool,
    },
    RunFinished {
        run_id: String,
        outcome: String,
        steps: usize,
        error: Option<String>,
    },
    Question {
        question: String,
    },
    Message {
        text: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Delivered to current subscribers only; no subscribers is not an error.
    pub fn emit(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("agent event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Mirrors operator traffic onto the event bus before delegating.
pub struct AnnouncingOperator {
    inner: Arc<dyn Operator>,
    bus: EventBus,
}

impl AnnouncingOperator {
    pub fn new(inner: Arc<dyn Operator>, bus: EventBus) -> Self {
        Self { inner, bus }
    }
}

#[async_trait]
impl Operator for AnnouncingOperator {
    async fn ask(&self, question: &str) -> DeskPilotResult<String> {
        self.bus.emit(AgentEvent::Question {
            question: question.to_string(),
        });
        self.inner.ask(question).await
    }

    async fn notify(&self, message: &str) {
        self.bus.emit(AgentEvent::Message {
            text: message.to_string(),
        });
        self.inner.notify(message).await;
    }
}
