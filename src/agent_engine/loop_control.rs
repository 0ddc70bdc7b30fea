use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::agent_engine::state::RunOutcome;

/// Requests a stop. Checked between steps and by a blocked `ask_user`.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Re-arm before the next run.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Run limits evaluated at step boundaries.
pub struct LoopController {
    max_steps: u32,
    max_duration: Option<Duration>,
    start_time: Instant,
    stop: StopSignal,
}

impl LoopController {
    pub fn new(max_steps: u32, max_duration: Option<Duration>, stop: StopSignal) -> Self {
        Self {
            max_steps,
            max_duration,
            start_time: Instant::now(),
            stop,
        }
    }

    /// The outcome that ends the run before another step starts, if any.
    pub fn should_stop(&self, steps_taken: usize) -> Option<RunOutcome> {
        if self.stop.is_stopped() {
            return Some(RunOutcome::Stopped);
        }
        if steps_taken >= self.max_steps as usize {
            return Some(RunOutcome::StepBudgetExhausted);
        }
        match self.max_duration {
            Some(limit) if self.start_time.elapsed() >= limit => Some(RunOutcome::TimeLimitReached),
            _ => None,
        }
    }
}
