//! Operations, spawned models and their lifecycle

use crate::config::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Kinds of work a spawned model can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Reasoning,
    Generation,
    Analysis,
    Embedding,
    ToolUse,
}

impl OperationType {
    pub const ALL: [OperationType; 5] = [
        OperationType::Reasoning,
        OperationType::Generation,
        OperationType::Analysis,
        OperationType::Embedding,
        OperationType::ToolUse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Reasoning => "reasoning",
            OperationType::Generation => "generation",
            OperationType::Analysis => "analysis",
            OperationType::Embedding => "embedding",
            OperationType::ToolUse => "tool_use",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work submitted to the spawner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    pub operation_type: OperationType,
    /// Estimated cost in budget units (cents)
    pub estimated_cost: u64,
    #[serde(default)]
    pub estimated_input_tokens: u64,
    #[serde(default)]
    pub payload: Value,
}

impl Operation {
    pub fn new(operation_type: OperationType, estimated_cost: u64) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            operation_type,
            estimated_cost,
            estimated_input_tokens: 0,
            payload: Value::Null,
        }
    }

    pub fn with_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = operation_id.into();
        self
    }

    pub fn with_input_tokens(mut self, tokens: u64) -> Self {
        self.estimated_input_tokens = tokens;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Provider and model chosen for one spawned operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: Provider,
    pub model: String,
}

impl ModelSelection {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Lifecycle of a spawned model: `pending → running → completed | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ModelStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelStatus::Completed | ModelStatus::Failed)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelStatus::Pending => "pending",
            ModelStatus::Running => "running",
            ModelStatus::Completed => "completed",
            ModelStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a handler produced for a successful operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutput {
    pub result: Value,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

/// Status change applied to a [`SpawnedModel`] by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started { at: DateTime<Utc> },
    Succeeded { output: OperationOutput, at: DateTime<Utc> },
    Failed { error: String, at: DateTime<Utc> },
}

impl Transition {
    pub fn target(&self) -> ModelStatus {
        match self {
            Transition::Started { .. } => ModelStatus::Running,
            Transition::Succeeded { .. } => ModelStatus::Completed,
            Transition::Failed { .. } => ModelStatus::Failed,
        }
    }
}

/// One model execution tracked by the spawner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnedModel {
    pub model_id: String,
    pub operation_id: String,
    pub operation_type: OperationType,
    pub model_selection: ModelSelection,
    pub status: ModelStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// Actual cost reported by the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl SpawnedModel {
    pub fn pending(
        model_id: impl Into<String>,
        operation: &Operation,
        selection: ModelSelection,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            operation_id: operation.operation_id.clone(),
            operation_type: operation.operation_type,
            model_selection: selection,
            status: ModelStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            duration_ms: None,
            tokens_used: None,
            cost_usd: None,
        }
    }

    /// Whether `transition` is legal from the current status
    pub fn accepts(&self, transition: &Transition) -> bool {
        matches!(
            (self.status, transition),
            (ModelStatus::Pending, Transition::Started { .. })
                | (ModelStatus::Running, Transition::Succeeded { .. })
                | (ModelStatus::Running, Transition::Failed { .. })
        )
    }

    /// Apply a transition already checked with [`accepts`](Self::accepts)
    pub(crate) fn apply(&mut self, transition: Transition) {
        self.status = transition.target();
        match transition {
            Transition::Started { at } => self.started_at = Some(at),
            Transition::Succeeded { output, at } => {
                self.finish(at);
                self.result = Some(output.result);
                self.tokens_used = Some(output.tokens_used);
                self.cost_usd = Some(output.cost_usd);
            }
            Transition::Failed { error, at } => {
                self.finish(at);
                self.error = Some(error);
            }
        }
    }

    /// Mark a model that will never run to completion as failed
    pub(crate) fn abandon(&mut self, reason: &str) {
        let now = Utc::now();
        self.status = ModelStatus::Failed;
        self.finish(now);
        self.error = Some(reason.to_string());
    }

    fn finish(&mut self, at: DateTime<Utc>) {
        let from = self.started_at.unwrap_or(self.created_at);
        self.completed_at = Some(at);
        self.duration_ms = Some((at - from).num_milliseconds().max(0) as u64);
    }
}

/// Everything a handler needs to execute one spawned model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub model_id: String,
    pub user_id: String,
    /// Upstream state snapshot supplied by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub operation: Operation,
    /// Budget left after deducting this operation's estimate
    pub budget_remaining: u64,
}
