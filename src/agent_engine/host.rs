use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::agent_engine::engine::AgentLoop;
use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::agent_engine::loop_control::StopHandle;
use crate::agent_engine::state::RunReport;
use crate::errors::{DeskPilotError, DeskPilotResult};

/// A goal queued for the background worker.
pub struct GoalRequest {
    pub goal: String,
    pub max_steps: Option<u32>,
    pub reply: Option<oneshot::Sender<RunReport>>,
}

/// Front-end side of a running agent: submit goals, stop the current run,
/// watch progress.
pub struct AgentHandle {
    tx: mpsc::Sender<GoalRequest>,
    stop: StopHandle,
    bus: EventBus,
    worker: JoinHandle<()>,
}

/// Owns the loop on a background task. Goals run one at a time in
/// submission order.
pub struct AgentHost;

impl AgentHost {
    pub fn spawn(agent: AgentLoop, bus: EventBus, stop: StopHandle) -> AgentHandle {
        let (tx, rx) = mpsc::channel::<GoalRequest>(32);
        let worker_stop = stop.clone();
        tracing::info!("spawning agent worker");
        let worker = tokio::spawn(async move {
            worker_loop(agent, rx, worker_stop).await;
            tracing::info!("agent worker exited");
        });
        AgentHandle {
            tx,
            stop,
            bus,
            worker,
        }
    }
}

async fn worker_loop(mut agent: AgentLoop, mut rx: mpsc::Receiver<GoalRequest>, stop: StopHandle) {
    while let Some(request) = rx.recv().await {
        // A stop aimed at an earlier run must not cancel this one.
        stop.reset();
        let report = agent.run(&request.goal, request.max_steps).await;
        if let Some(reply) = request.reply {
            if reply.send(report).is_err() {
                tracing::debug!("goal submitter went away before the report was ready");
            }
        }
    }
}

impl AgentHandle {
    /// Queue `goal`; the receiver resolves with the finished run's report.
    pub async fn submit(
        &self,
        goal: impl Into<String>,
        max_steps: Option<u32>,
    ) -> DeskPilotResult<oneshot::Receiver<RunReport>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(GoalRequest {
                goal: goal.into(),
                max_steps,
                reply: Some(reply),
            })
            .await
            .map_err(|_| DeskPilotError::Cancelled)?;
        Ok(rx)
    }

    /// Ends the current run at the next step boundary.
    pub fn stop(&self) {
        tracing::info!("stop requested");
        self.stop.stop();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.bus.subscribe()
    }

    /// Finishes queued goals, then waits for the worker to exit.
    pub async fn shutdown(self) -> DeskPilotResult<()> {
        drop(self.tx);
        self.worker
            .await
            .map_err(|e| DeskPilotError::Operator(format!("agent worker failed: {e}")))
    }
}
