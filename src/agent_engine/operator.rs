//! The human on the other side of `ask_user` / `talk_to_user`.
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::agent_engine::loop_control::StopSignal;
use crate::errors::{DeskPilotError, DeskPilotResult};

#[async_trait]
pub trait Operator: Send + Sync {
    /// Blocks until the operator replies. A stop request yields an empty reply.
    async fn ask(&self, question: &str) -> DeskPilotResult<String>;
    /// Fire-and-forget message.
    async fn notify(&self, message: &str);
}

/// A question waiting for the front end.
#[derive(Debug)]
pub struct OperatorRequest {
    pub question: String,
    pub reply: oneshot::Sender<String>,
}

impl OperatorRequest {
    /// The asker gave up, usually because the run was stopped. Front ends
    /// should skip these instead of prompting the user.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Operator backed by channels, for front ends that run on another task.
pub struct ChannelOperator {
    questions: mpsc::Sender<OperatorRequest>,
    messages: mpsc::UnboundedSender<String>,
    stop: StopSignal,
}

impl ChannelOperator {
    pub fn new(
        questions: mpsc::Sender<OperatorRequest>,
        messages: mpsc::UnboundedSender<String>,
        stop: StopSignal,
    ) -> Self {
        Self { questions, messages, stop }
    }
}

#[async_trait]
impl Operator for ChannelOperator {
    async fn ask(&self, question: &str) -> DeskPilotResult<String> {
        let mut stop = self.stop.receiver();
        if *stop.borrow() {
            return Ok(String::new());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = OperatorRequest {
            question: question.to_string(),
            reply: reply_tx,
        };

        // A full queue must not outlive a stop request.
        tokio::select! {
            sent = self.questions.send(request) => {
                sent.map_err(|_| DeskPilotError::Operator("operator channel closed".into()))?;
            }
            _ = stopped(&mut stop) => {
                tracing::info!("stop requested while queueing the question");
                return Ok(String::new());
            }
        }

        tokio::select! {
            reply = reply_rx => reply.map_err(|_| DeskPilotError::Operator("operator dropped the question".into())),
            _ = stopped(&mut stop) => {
                tracing::info!("stop requested while waiting for the operator");
                Ok(String::new())
            }
        }
    }

    async fn notify(&self, message: &str) {
        if self.messages.send(message.to_string()).is_err() {
            tracing::warn!("operator message dropped: receiver gone");
        }
    }
}

/// Resolves once stop is requested; never resolves if the stop sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Terminal operator used by the CLI: questions on stderr, replies on stdin.
///
/// One reader is kept for the whole run so input buffered during an earlier
/// question is not lost.
pub struct ConsoleOperator {
    input: Mutex<LineSource>,
    stop: StopSignal,
}

impl ConsoleOperator {
    pub fn new(stop: StopSignal) -> Self {
        Self::with_reader(Box::new(BufReader::new(tokio::io::stdin())), stop)
    }

    fn with_reader(input: LineSource, stop: StopSignal) -> Self {
        Self {
            input: Mutex::new(input),
            stop,
        }
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn ask(&self, question: &str) -> DeskPilotResult<String> {
        let mut stop = self.stop.receiver();
        if *stop.borrow() {
            return Ok(String::new());
        }
        eprintln!("\n[agent asks] {question}");
        eprint!("> ");
        let mut input = self.input.lock().await;
        let mut line = String::new();
        tokio::select! {
            read = input.read_line(&mut line) => {
                read?;
                Ok(line.trim().to_string())
            }
            _ = stopped(&mut stop) => {
                eprintln!();
                tracing::info!("stop requested while waiting for console input");
                Ok(String::new())
            }
        }
    }

    async fn notify(&self, message: &str) {
        eprintln!("\n[agent] {message}");
    }
}
