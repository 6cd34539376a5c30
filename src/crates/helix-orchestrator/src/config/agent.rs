//! Resolution of user-supplied agent configuration

use super::{AgentRole, OrchestratorConfig};
use crate::{OrchestratorError, Result};
use serde_json::Value;

/// Merge a partial user config over the built-in defaults
///
/// Objects merge key by key at every depth, so `{"memoryAgent": {"model":
/// "x"}}` changes one field of one role and leaves everything else at its
/// default. Any other value replaces what it lands on. An explicit `null`
/// for a role removes it, and every role that ends up absent or null is
/// reported in a single [`OrchestratorError::Configuration`].
///
/// ```rust
/// use helix_orchestrator::{create_agent_config, OrchestratorConfig, Provider};
/// use serde_json::json;
///
/// let user = json!({ "actionAgent": { "provider": "local" } });
/// let config = create_agent_config(Some(&user)).unwrap();
/// assert_eq!(config.action_agent.provider, Provider::Local);
/// assert_eq!(config.supervisor, OrchestratorConfig::default().supervisor);
/// ```
pub fn create_agent_config(user_config: Option<&Value>) -> Result<OrchestratorConfig> {
    let mut merged = serde_json::to_value(OrchestratorConfig::default())?;

    if let Some(user) = user_config {
        if !user.is_object() {
            return Err(OrchestratorError::invalid_config(
                "agent configuration must be a JSON object",
            ));
        }
        deep_merge(&mut merged, user);
    }

    let missing: Vec<String> = AgentRole::ALL
        .iter()
        .map(AgentRole::config_key)
        .filter(|key| merged.get(*key).map_or(true, Value::is_null))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        tracing::error!(missing = ?missing, "Agent configuration incomplete");
        return Err(OrchestratorError::Configuration { missing });
    }

    let config: OrchestratorConfig = serde_json::from_value(merged)
        .map_err(|e| OrchestratorError::invalid_config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Recursively merge `overlay` into `base`
fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
