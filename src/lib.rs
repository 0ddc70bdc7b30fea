pub mod action;
pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::agent_engine::engine::{AgentLoop, LoopSettings};
use crate::agent_engine::operator::Operator;
use crate::config::{AppConfig, PerceptionBackend};
use crate::errors::DeskPilotResult;
use crate::executor::coordinator::CoordinateSystem;
use crate::executor::dispatcher::{ActionExecutor, ExecutorTiming};
use crate::executor::input::InputDevice;
use crate::llm::registry::ProviderRegistry;
use crate::perception::omniparser::OmniParserClient;
use crate::perception::screenshot::ScreenSource;
use crate::perception::som_grid::GridPerception;
use crate::perception::traits::PerceptionPort;

/// Perception backend selected by `[perception] backend`.
pub fn perception_from_config(cfg: &AppConfig) -> Arc<dyn PerceptionPort> {
    match cfg.perception.backend {
        PerceptionBackend::Omniparser => Arc::new(OmniParserClient::new(&cfg.perception)),
        PerceptionBackend::Grid => Arc::new(GridPerception::new(cfg.perception.grid_size)),
    }
}

/// Wire a loop from config and the given desktop primitives.
pub fn build_agent(
    cfg: &AppConfig,
    screen: Arc<dyn ScreenSource>,
    input: Arc<dyn InputDevice>,
    operator: Arc<dyn Operator>,
) -> DeskPilotResult<AgentLoop> {
    let registry = ProviderRegistry::from_config(&cfg.llm);
    let (decision, summary) = registry.ports()?;
    tracing::info!(
        decision = decision.name(),
        summary = summary.name(),
        perception = ?cfg.perception.backend,
        screen = cfg.agent.screen,
        "agent assembled"
    );
    let executor = ActionExecutor::new(
        CoordinateSystem::new(screen),
        input,
        cfg.agent.screen,
        ExecutorTiming::from(&cfg.agent),
    )
    .with_operator(operator);
    Ok(AgentLoop::new(
        perception_from_config(cfg),
        decision,
        summary,
        executor,
        LoopSettings::from(&cfg.agent),
    ))
}
