//! Registry of spawned models and their execution contexts

use super::operation::{ExecutionContext, SpawnedModel, Transition};
use crate::{OrchestratorError, Result};
use dashmap::DashMap;

/// Spawned models and their contexts, keyed by model id
///
/// Each [`ModelSpawner`](super::ModelSpawner) owns one registry. A model
/// and its context are inserted together and removed together.
#[derive(Debug, Default)]
pub struct SpawnRegistry {
    models: DashMap<String, SpawnedModel>,
    contexts: DashMap<String, ExecutionContext>,
}

impl SpawnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model: SpawnedModel, context: ExecutionContext) {
        self.contexts.insert(model.model_id.clone(), context);
        self.models.insert(model.model_id.clone(), model);
    }

    /// Apply a lifecycle transition, returning the updated snapshot
    pub fn apply(&self, model_id: &str, transition: Transition) -> Result<SpawnedModel> {
        let mut model = self
            .models
            .get_mut(model_id)
            .ok_or_else(|| OrchestratorError::operation(format!("unknown model {}", model_id)))?;

        if !model.accepts(&transition) {
            return Err(OrchestratorError::InvalidTransition {
                model_id: model_id.to_string(),
                from: model.status.to_string(),
                to: transition.target().to_string(),
            });
        }
        model.apply(transition);
        Ok(model.clone())
    }

    pub fn get(&self, model_id: &str) -> Option<SpawnedModel> {
        self.models.get(model_id).map(|m| m.clone())
    }

    /// All tracked models, oldest first
    pub fn models(&self) -> Vec<SpawnedModel> {
        let mut models: Vec<SpawnedModel> = self.models.iter().map(|m| m.clone()).collect();
        models.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.contexts.iter().map(|c| c.clone()).collect()
    }

    /// Remove every completed or failed model with its context
    pub fn clear_completed(&self) -> usize {
        let settled: Vec<String> = self
            .models
            .iter()
            .filter(|m| m.status.is_terminal())
            .map(|m| m.model_id.clone())
            .collect();

        let mut removed = 0;
        for id in settled {
            if self
                .models
                .remove_if(&id, |_, m| m.status.is_terminal())
                .is_some()
            {
                self.contexts.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Fail every model that has not settled. Returns how many were touched.
    pub(crate) fn abandon_unsettled(&self, reason: &str) -> usize {
        let mut count = 0;
        for mut model in self.models.iter_mut() {
            if !model.status.is_terminal() {
                model.abandon(reason);
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::spawner::operation::{
        ModelSelection, ModelStatus, Operation, OperationOutput, OperationType,
    };
    use chrono::Utc;

    fn register(registry: &SpawnRegistry, id: &str) {
        let op = Operation::new(OperationType::Reasoning, 5);
        let model = SpawnedModel::pending(id, &op, ModelSelection::new(Provider::Local, "m"));
        let ctx = ExecutionContext {
            model_id: id.to_string(),
            user_id: "u".to_string(),
            context: None,
            operation: op,
            budget_remaining: 0,
        };
        registry.register(model, ctx);
    }

    fn succeed(registry: &SpawnRegistry, id: &str) {
        registry.apply(id, Transition::Started { at: Utc::now() }).unwrap();
        registry
            .apply(
                id,
                Transition::Succeeded {
                    output: OperationOutput {
                        result: serde_json::Value::Null,
                        tokens_used: 1,
                        cost_usd: 0.0,
                    },
                    at: Utc::now(),
                },
            )
            .unwrap();
    }

    #[test]
    fn test_rejects_illegal_transition() {
        let registry = SpawnRegistry::new();
        register(&registry, "m-1");

        let err = registry
            .apply(
                "m-1",
                Transition::Failed {
                    error: "x".into(),
                    at: Utc::now(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(registry.get("m-1").unwrap().status, ModelStatus::Pending);

        assert!(registry
            .apply("ghost", Transition::Started { at: Utc::now() })
            .is_err());
    }

    #[test]
    fn test_clear_completed_keeps_live_models() {
        let registry = SpawnRegistry::new();
        register(&registry, "done");
        register(&registry, "live");
        succeed(&registry, "done");

        assert_eq!(registry.clear_completed(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.contexts().len(), 1);
        assert!(registry.get("done").is_none());
        assert!(registry.get("live").is_some());
    }

    #[test]
    fn test_abandon_unsettled() {
        let registry = SpawnRegistry::new();
        register(&registry, "a");
        register(&registry, "b");
        succeed(&registry, "b");

        assert_eq!(registry.abandon_unsettled("shutdown"), 1);
        let a = registry.get("a").unwrap();
        assert_eq!(a.status, ModelStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("shutdown"));
    }
}
