use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

pub const CONFIG_FILE_NAME: &str = "deskpilot.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint, e.g. `https://host/v1/chat/completions`.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional API key stored in the config file (falls back to env var DESKPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps the two model calls of a step to provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Chooses the next action from the labeled screenshot.
    pub decision: Option<RoleEntry>,
    /// Describes what changed between the before/after screenshots.
    pub summary: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionBackend {
    /// Remote OmniParser-style detection service.
    #[default]
    Omniparser,
    /// Local numbered grid overlay, no service required.
    Grid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    #[serde(default)]
    pub backend: PerceptionBackend,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_true")]
    pub use_paddleocr: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            backend: PerceptionBackend::default(),
            server_url: default_server_url(),
            box_threshold: default_box_threshold(),
            iou_threshold: default_iou_threshold(),
            use_paddleocr: true,
            timeout_secs: default_timeout_secs(),
            grid_size: default_grid_size(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:8000".into()
}

fn default_box_threshold() -> f32 {
    0.05
}

fn default_iou_threshold() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_grid_size() -> u32 {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default monitor for observation and action targets (0 = primary).
    #[serde(default)]
    pub screen: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Optional wall-clock limit for one run, checked between steps.
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    /// Pause after each action before the "after" screenshot.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Duration of the `wait` action.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    /// Pause between the focusing click and typing for `input_text`.
    #[serde(default = "default_focus_settle_ms")]
    pub focus_settle_ms: u64,
    #[serde(default = "default_scroll_amount")]
    pub scroll_amount: i32,
    #[serde(default = "default_drag_duration_ms")]
    pub drag_duration_ms: u64,
    #[serde(default = "default_drag_steps")]
    pub drag_steps: u32,
    /// Require an `Action:` block; disables the bare-JSON fallback scan.
    #[serde(default)]
    pub strict_action_block: bool,
    /// Extra instructions appended to every decision prompt.
    #[serde(default)]
    pub guidelines: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            screen: 0,
            max_steps: default_max_steps(),
            max_duration_minutes: None,
            settle_ms: default_settle_ms(),
            wait_ms: default_wait_ms(),
            focus_settle_ms: default_focus_settle_ms(),
            scroll_amount: default_scroll_amount(),
            drag_duration_ms: default_drag_duration_ms(),
            drag_steps: default_drag_steps(),
            strict_action_block: false,
            guidelines: String::new(),
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_settle_ms() -> u64 {
    1500
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_focus_settle_ms() -> u64 {
    300
}

fn default_scroll_amount() -> i32 {
    5
}

fn default_drag_duration_ms() -> u64 {
    500
}

fn default_drag_steps() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn resolve_config_path(explicit: Option<&Path>) -> DeskPilotResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(DeskPilotError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("deskpilot").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(DeskPilotError::Config(format!(
        "{CONFIG_FILE_NAME} not found next to executable, in working directory or user config dir"
    )))
}

pub fn parse_config(content: &str) -> DeskPilotResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.agent.max_steps == 0 {
        return Err(DeskPilotError::Config("agent.max_steps must be at least 1".into()));
    }
    Ok(config)
}

pub fn load_config(explicit: Option<&Path>) -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[llm]
active_provider = "qwen"

[llm.providers.qwen]
display_name = "Qwen"
api_base = "https://example.invalid/v1/chat/completions"
model = "qwen-vl-max"
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.llm.active_provider, "qwen");
        assert_eq!(cfg.llm.providers["qwen"].temperature, 0.1);
        assert_eq!(cfg.llm.providers["qwen"].max_tokens, 4096);
        assert_eq!(cfg.perception.backend, PerceptionBackend::Omniparser);
        assert_eq!(cfg.agent.screen, 0);
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.agent.settle_ms, 1500);
        assert!(!cfg.agent.strict_action_block);
    }

    #[test]
    fn agent_and_roles_sections_override() {
        let text = format!(
            "{MINIMAL}\n[llm.roles.summary]\nprovider = \"qwen\"\nmodel = \"qwen-plus\"\n\n\
             [perception]\nbackend = \"grid\"\ngrid_size = 8\n\n\
             [agent]\nscreen = 1\nmax_steps = 20\nstrict_action_block = true\n"
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.llm.roles.summary.as_ref().unwrap().model, "qwen-plus");
        assert!(cfg.llm.roles.decision.is_none());
        assert_eq!(cfg.perception.backend, PerceptionBackend::Grid);
        assert_eq!(cfg.perception.grid_size, 8);
        assert_eq!(cfg.agent.screen, 1);
        assert_eq!(cfg.agent.max_steps, 20);
        assert!(cfg.agent.strict_action_block);
    }

    #[test]
    fn zero_step_budget_is_rejected() {
        let text = format!("{MINIMAL}\n[agent]\nmax_steps = 0\n");
        assert!(matches!(parse_config(&text), Err(DeskPilotError::Config(_))));
    }

    #[test]
    fn saved_config_loads_back() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        cfg.agent.screen = 2;
        cfg.agent.max_steps = 7;
        cfg.perception.backend = PerceptionBackend::Grid;
        let path = std::env::temp_dir().join(format!("deskpilot-{}.toml", uuid::Uuid::new_v4()));

        save_config(&cfg, &path).unwrap();
        let loaded = load_config(Some(&path));
        std::fs::remove_file(&path).unwrap();

        let loaded = loaded.unwrap();
        assert_eq!(loaded.llm.active_provider, "qwen");
        assert_eq!(loaded.llm.providers["qwen"].model, "qwen-vl-max");
        assert_eq!(loaded.perception.backend, PerceptionBackend::Grid);
        assert_eq!(loaded.agent.screen, 2);
        assert_eq!(loaded.agent.max_steps, 7);
        assert_eq!(loaded.agent.settle_ms, cfg.agent.settle_ms);
    }

    #[test]
    fn missing_explicit_path_is_config_error() {
        let err = load_config(Some(Path::new("/nonexistent/deskpilot.toml"))).unwrap_err();
        assert!(matches!(err, DeskPilotError::Config(_)));
    }
}
