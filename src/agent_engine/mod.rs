pub mod engine;
pub mod event_bus;
pub mod history;
pub mod host;
pub mod loop_control;
pub mod operator;
pub mod prompts;
pub mod state;

pub use engine::{AgentLoop, LoopSettings};
pub use event_bus::{AgentEvent, AnnouncingOperator, EventBus};
pub use host::{AgentHandle, AgentHost, GoalRequest};
pub use loop_control::{stop_channel, StopHandle, StopSignal};
pub use operator::{ChannelOperator, ConsoleOperator, Operator, OperatorRequest};
pub use state::{LoopState, RunOutcome, RunReport, StepResult};
