//! YAML configuration files
//!
//! A config file is a partial [`OrchestratorConfig`](super::OrchestratorConfig)
//! document in YAML. Before it is merged over the defaults:
//! - `${VAR}` and `${VAR:default}` inside strings are replaced from the
//!   environment (unset without a default becomes the empty string)
//! - a mapping of the form `{ $include: other.yaml }` is replaced by the
//!   contents of that file, resolved relative to the including file

use super::{create_agent_config, OrchestratorConfig};
use crate::{OrchestratorError, Result};
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::env;
use std::fs;
use std::path::Path;

const INCLUDE_KEY: &str = "$include";
const MAX_INCLUDE_DEPTH: usize = 8;

/// Load a YAML config file and resolve it into a complete configuration
pub fn load_config_file(path: impl AsRef<Path>) -> Result<OrchestratorConfig> {
    let path = path.as_ref();
    let yaml = load_yaml_file(path)?;
    let json = yaml_to_json(&yaml)?;
    let config = create_agent_config(Some(&json))?;
    tracing::info!(path = %path.display(), "Loaded orchestrator config");
    Ok(config)
}

/// Read a YAML file with includes resolved and environment references expanded
pub fn load_yaml_file(path: impl AsRef<Path>) -> Result<YamlValue> {
    load_with_depth(path.as_ref(), 0)
}

fn load_with_depth(path: &Path, depth: usize) -> Result<YamlValue> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(OrchestratorError::invalid_config(format!(
            "includes nested deeper than {} levels at {}",
            MAX_INCLUDE_DEPTH,
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        OrchestratorError::invalid_config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut value: YamlValue = serde_yaml::from_str(&content)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_includes(&mut value, base_dir, depth)?;
    expand_variables(&mut value, &|name: &str| env::var(name).ok());
    Ok(value)
}

fn resolve_includes(value: &mut YamlValue, base_dir: &Path, depth: usize) -> Result<()> {
    match value {
        YamlValue::Mapping(map) => {
            let include = map
                .get(INCLUDE_KEY)
                .and_then(YamlValue::as_str)
                .map(str::to_string);
            if let Some(include) = include {
                *value = load_with_depth(&base_dir.join(include), depth + 1)?;
                return Ok(());
            }
            for (_, v) in map.iter_mut() {
                resolve_includes(v, base_dir, depth)?;
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                resolve_includes(item, base_dir, depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_variables(value: &mut YamlValue, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        YamlValue::String(s) => {
            if s.contains("${") {
                *s = expand_env_in_string(s, lookup);
            }
        }
        YamlValue::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_variables(v, lookup);
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                expand_variables(item, lookup);
            }
        }
        _ => {}
    }
}

/// Replace `${VAR}` / `${VAR:default}` references using `lookup`
pub fn expand_env_in_string(s: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let Ok(re) = Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}") else {
        return s.to_string();
    };
    re.replace_all(s, |cap: &Captures<'_>| {
        lookup(&cap[1])
            .or_else(|| cap.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_default()
    })
    .into_owned()
}

/// Convert a YAML value into JSON. Mapping keys must be strings.
pub fn yaml_to_json(yaml: &YamlValue) -> Result<JsonValue> {
    match yaml {
        YamlValue::Null => Ok(JsonValue::Null),
        YamlValue::Bool(b) => Ok(JsonValue::Bool(*b)),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(JsonValue::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(JsonValue::from(u))
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .ok_or_else(|| {
                        OrchestratorError::invalid_config(format!("invalid number: {}", n))
                    })
            }
        }
        YamlValue::String(s) => Ok(JsonValue::String(s.clone())),
        YamlValue::Sequence(seq) => seq
            .iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        YamlValue::Mapping(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key = k.as_str().ok_or_else(|| {
                    OrchestratorError::invalid_config(format!(
                        "mapping key must be a string: {:?}",
                        k
                    ))
                })?;
                object.insert(key.to_string(), yaml_to_json(v)?);
            }
            Ok(JsonValue::Object(object))
        }
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
