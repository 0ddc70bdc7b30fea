use std::sync::Arc;

use crate::config::{LlmConfig, ProviderEntry};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::DecisionPort;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// The two model calls made per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Decision,
    Summary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Decision => "decision",
            Role::Summary => "summary",
        }
    }
}

/// Resolves configured providers and roles into ready-to-call decision ports.
pub struct ProviderRegistry {
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            llm_config: config.clone(),
        }
    }

    pub fn active(&self) -> &str {
        &self.llm_config.active_provider
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.llm_config.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider_entry(&self, id: &str) -> DeskPilotResult<&ProviderEntry> {
        self.llm_config
            .providers
            .get(id)
            .ok_or_else(|| DeskPilotError::Config(format!("provider '{id}' is not configured")))
    }

    /// Provider id and call configuration for a role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in the config file
    /// 2. Fallback: active provider with its default model / temperature and `stream = true`
    pub fn call_config_for_role(&self, role: Role) -> DeskPilotResult<(String, CallConfig)> {
        let role_entry = match role {
            Role::Decision => self.llm_config.roles.decision.as_ref(),
            Role::Summary => self.llm_config.roles.summary.as_ref(),
        };

        if let Some(entry) = role_entry {
            let provider = self.provider_entry(&entry.provider).map_err(|_| {
                DeskPilotError::Config(format!(
                    "role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let cfg = CallConfig {
                model: entry.model.clone(),
                stream: entry.stream,
                temperature: entry.temperature.unwrap_or(provider.temperature),
                max_tokens: provider.max_tokens,
            };
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %cfg.model,
                stream = cfg.stream,
                temperature = cfg.temperature,
                "resolved role config"
            );
            return Ok((entry.provider.clone(), cfg));
        }

        let active = self.active();
        let provider = self.provider_entry(active)?;
        tracing::debug!(
            role = role.as_str(),
            provider = %active,
            model = %provider.model,
            "role not configured, using active provider fallback"
        );
        Ok((
            active.to_string(),
            CallConfig {
                model: provider.model.clone(),
                stream: true,
                temperature: provider.temperature,
                max_tokens: provider.max_tokens,
            },
        ))
    }

    /// API key from env `DESKPILOT_<ID>_API_KEY`, else the config field.
    pub fn api_key(&self, id: &str) -> DeskPilotResult<String> {
        self.api_key_from(id, |name| std::env::var(name).ok())
    }

    fn api_key_from(&self, id: &str, env: impl Fn(&str) -> Option<String>) -> DeskPilotResult<String> {
        let env_name = api_key_env_name(id);
        if let Some(key) = env(&env_name) {
            return Ok(key);
        }
        let key = self.provider_entry(id)?.api_key.clone().unwrap_or_default();
        if key.is_empty() {
            tracing::warn!(provider = id, env = %env_name, "no API key configured; sending unauthenticated requests");
        }
        Ok(key)
    }

    pub fn port_for_role(&self, role: Role) -> DeskPilotResult<Arc<dyn DecisionPort>> {
        let (id, call) = self.call_config_for_role(role)?;
        let entry = self.provider_entry(&id)?;
        let api_key = self.api_key(&id)?;
        Ok(Arc::new(OpenAiCompatibleProvider::new(
            id,
            entry.api_base.clone(),
            api_key,
            call,
        )))
    }

    /// Ports for the decision and summary calls, in that order.
    pub fn ports(&self) -> DeskPilotResult<(Arc<dyn DecisionPort>, Arc<dyn DecisionPort>)> {
        Ok((self.port_for_role(Role::Decision)?, self.port_for_role(Role::Summary)?))
    }
}

fn api_key_env_name(id: &str) -> String {
    format!("DESKPILOT_{}_API_KEY", id.to_uppercase().replace('-', "_"))
}
