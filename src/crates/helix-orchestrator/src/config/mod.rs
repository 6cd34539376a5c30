//! Orchestrator configuration
//!
//! One [`ModelConfig`] per agent role, plus run-wide switches. The serde
//! form uses the camelCase keys users write in JSON and YAML:
//!
//! ```yaml
//! supervisor:     { provider: anthropic, model: claude-3-5-sonnet-latest, temperature: 0.3 }
//! narrativeAgent: { provider: anthropic, model: claude-3-5-sonnet-latest, temperature: 0.8 }
//! memoryAgent:    { provider: openai,    model: gpt-4o-mini,              temperature: 0.2 }
//! purposeAgent:   { provider: anthropic, model: claude-3-5-haiku-latest,  temperature: 0.5 }
//! actionAgent:    { provider: deepseek,  model: deepseek-chat,            temperature: 0.2 }
//! approvalMode: budget_gated
//! enableCheckpointing: true
//! maxSteps: 25
//! ```
//!
//! Partial user documents are merged over [`OrchestratorConfig::default`]
//! by [`create_agent_config`]; YAML files go through [`loader`].

mod agent;
pub mod loader;

pub use agent::create_agent_config;

use crate::{OrchestratorError, Result};
use helix_graph::DEFAULT_MAX_STEPS;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

/// Model vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    DeepSeek,
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::DeepSeek => "deepseek",
            Provider::Local => "local",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How spends from the action agent are approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Operations are declined when their estimate exceeds the remaining budget
    #[default]
    BudgetGated,
    /// Operations always proceed; spend is clamped at zero remaining
    Unrestricted,
}

impl std::str::FromStr for ApprovalMode {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "budget_gated" | "budget-gated" => Ok(Self::BudgetGated),
            "unrestricted" => Ok(Self::Unrestricted),
            other => Err(OrchestratorError::invalid_config(format!(
                "unknown approval mode '{}'",
                other
            ))),
        }
    }
}

/// The five agent roles of the orchestration graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Supervisor,
    Narrative,
    Memory,
    Purpose,
    Action,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Supervisor,
        AgentRole::Narrative,
        AgentRole::Memory,
        AgentRole::Purpose,
        AgentRole::Action,
    ];

    /// Key of this role in a configuration document
    pub fn config_key(&self) -> &'static str {
        match self {
            AgentRole::Supervisor => "supervisor",
            AgentRole::Narrative => "narrativeAgent",
            AgentRole::Memory => "memoryAgent",
            AgentRole::Purpose => "purposeAgent",
            AgentRole::Action => "actionAgent",
        }
    }

    /// Graph node name and routing label of this role
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Supervisor => "supervisor",
            AgentRole::Narrative => "narrative",
            AgentRole::Memory => "memory",
            AgentRole::Purpose => "purpose",
            AgentRole::Action => "action",
        }
    }
}

/// Model settings for one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub provider: Provider,

    /// Model identifier (e.g. "claude-3-5-sonnet-latest", "gpt-4o-mini")
    pub model: String,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_enable_checkpointing() -> bool {
    true
}

impl ModelConfig {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn validate(&self, role: AgentRole) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(OrchestratorError::invalid_config(format!(
                "{}: model identifier cannot be empty",
                role.config_key()
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(OrchestratorError::invalid_config(format!(
                "{}: temperature must be between 0.0 and 1.0, got {}",
                role.config_key(),
                self.temperature
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(OrchestratorError::invalid_config(format!(
                "{}: maxTokens must be greater than 0",
                role.config_key()
            )));
        }
        Ok(())
    }
}

/// Complete configuration for one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub supervisor: ModelConfig,
    pub narrative_agent: ModelConfig,
    pub memory_agent: ModelConfig,
    pub purpose_agent: ModelConfig,
    pub action_agent: ModelConfig,

    #[serde(default)]
    pub approval_mode: ApprovalMode,

    #[serde(default = "default_enable_checkpointing")]
    pub enable_checkpointing: bool,

    /// Node executions allowed per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Wall-clock limit per node, unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_ms: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            supervisor: ModelConfig::new(Provider::Anthropic, "claude-3-5-sonnet-latest")
                .with_temperature(0.3),
            narrative_agent: ModelConfig::new(Provider::Anthropic, "claude-3-5-sonnet-latest")
                .with_temperature(0.8),
            memory_agent: ModelConfig::new(Provider::OpenAi, "gpt-4o-mini").with_temperature(0.2),
            purpose_agent: ModelConfig::new(Provider::Anthropic, "claude-3-5-haiku-latest")
                .with_temperature(0.5),
            action_agent: ModelConfig::new(Provider::DeepSeek, "deepseek-chat")
                .with_temperature(0.2),
            approval_mode: ApprovalMode::default(),
            enable_checkpointing: default_enable_checkpointing(),
            max_steps: default_max_steps(),
            node_timeout_ms: None,
        }
    }
}

impl OrchestratorConfig {
    /// Model settings for `role`
    pub fn model_for(&self, role: AgentRole) -> &ModelConfig {
        match role {
            AgentRole::Supervisor => &self.supervisor,
            AgentRole::Narrative => &self.narrative_agent,
            AgentRole::Memory => &self.memory_agent,
            AgentRole::Purpose => &self.purpose_agent,
            AgentRole::Action => &self.action_agent,
        }
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    pub fn with_checkpointing(mut self, enabled: bool) -> Self {
        self.enable_checkpointing = enabled;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - HELIX_APPROVAL_MODE: `budget_gated` or `unrestricted`
    /// - HELIX_ENABLE_CHECKPOINTING: true/false
    /// - HELIX_MAX_STEPS: node executions per run
    /// - HELIX_NODE_TIMEOUT_MS: per-node timeout, `0` disables it
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// explicit variable lookup. Unparseable values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(mode) = lookup("HELIX_APPROVAL_MODE") {
            match mode.parse::<ApprovalMode>() {
                Ok(mode) => self.approval_mode = mode,
                Err(e) => tracing::warn!(error = %e, "Ignoring HELIX_APPROVAL_MODE"),
            }
        }

        if let Some(enabled) = lookup("HELIX_ENABLE_CHECKPOINTING") {
            self.enable_checkpointing = enabled.eq_ignore_ascii_case("true")
                || enabled == "1"
                || enabled.eq_ignore_ascii_case("yes");
        }

        if let Some(steps) = lookup("HELIX_MAX_STEPS") {
            if let Ok(value) = steps.parse::<usize>() {
                self.max_steps = value;
            }
        }

        if let Some(timeout) = lookup("HELIX_NODE_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.node_timeout_ms = (value > 0).then_some(value);
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for role in AgentRole::ALL {
            self.model_for(role).validate(role)?;
        }

        if self.max_steps == 0 {
            return Err(OrchestratorError::invalid_config(
                "maxSteps must be greater than 0",
            ));
        }

        if self.node_timeout_ms == Some(0) {
            return Err(OrchestratorError::invalid_config(
                "nodeTimeoutMs must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.approval_mode, ApprovalMode::BudgetGated);
        assert!(config.enable_checkpointing);
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_serde_uses_camel_case_keys() {
        let json = serde_json::to_value(OrchestratorConfig::default()).unwrap();
        for role in AgentRole::ALL {
            assert!(json.get(role.config_key()).is_some(), "{}", role.config_key());
        }
        assert_eq!(json["approvalMode"], "budget_gated");
        assert_eq!(json["memoryAgent"]["provider"], "openai");
        assert_eq!(json["actionAgent"]["provider"], "deepseek");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = OrchestratorConfig::default();
        config.purpose_agent.temperature = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("purposeAgent"));

        let config = OrchestratorConfig::default().with_max_steps(0);
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.supervisor.model = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HELIX_APPROVAL_MODE", "unrestricted"),
            ("HELIX_ENABLE_CHECKPOINTING", "no"),
            ("HELIX_MAX_STEPS", "7"),
            ("HELIX_NODE_TIMEOUT_MS", "1500"),
        ]);
        let mut config = OrchestratorConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.approval_mode, ApprovalMode::Unrestricted);
        assert!(!config.enable_checkpointing);
        assert_eq!(config.max_steps, 7);
        assert_eq!(config.node_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_overrides_ignore_garbage() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides_from(|k| match k {
            "HELIX_APPROVAL_MODE" => Some("whenever".into()),
            "HELIX_MAX_STEPS" => Some("many".into()),
            "HELIX_NODE_TIMEOUT_MS" => Some("0".into()),
            _ => None,
        });
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_role_labels() {
        let labels: Vec<_> = AgentRole::ALL.iter().map(AgentRole::label).collect();
        assert_eq!(labels, ["supervisor", "narrative", "memory", "purpose", "action"]);
    }
}
