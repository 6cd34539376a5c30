//! Per-operation-type handlers
//!
//! A [`HandlerTable`] maps every [`OperationType`] to the handler that
//! executes it. The builder refuses to produce a table with a gap, so
//! dispatch at run time never meets an unhandled type.

use super::operation::{ExecutionContext, ModelSelection, OperationOutput, OperationType};
use crate::{OrchestratorError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes one spawned model's operation
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn execute(
        &self,
        context: &ExecutionContext,
        selection: &ModelSelection,
    ) -> Result<OperationOutput>;
}

/// Complete operation-type to handler map
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(OperationType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerTable").field("types", &types).finish()
    }
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Table with the same handler for every type
    pub fn uniform(handler: Arc<dyn OperationHandler>) -> Self {
        let handlers = OperationType::ALL
            .iter()
            .map(|t| (*t, Arc::clone(&handler)))
            .collect();
        Self { handlers }
    }

    pub fn get(&self, operation_type: OperationType) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(&operation_type)
    }
}

#[derive(Default)]
pub struct HandlerTableBuilder {
    handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
}

impl HandlerTableBuilder {
    /// Register (or replace) the handler for one type
    pub fn handle(
        mut self,
        operation_type: OperationType,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        self.handlers.insert(operation_type, handler);
        self
    }

    /// Register `handler` for every type that has none yet
    pub fn fallback(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        for t in OperationType::ALL {
            self.handlers.entry(t).or_insert_with(|| Arc::clone(&handler));
        }
        self
    }

    /// Fails naming every type left without a handler
    pub fn build(self) -> Result<HandlerTable> {
        let missing: Vec<&str> = OperationType::ALL
            .iter()
            .filter(|t| !self.handlers.contains_key(*t))
            .map(OperationType::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::invalid_config(format!(
                "no handler registered for operation type(s): {}",
                missing.join(", ")
            )));
        }
        Ok(HandlerTable {
            handlers: self.handlers,
        })
    }
}

/// Handler that answers without calling any model
///
/// Echoes the operation payload and reports the estimated input tokens as
/// used, priced at a flat per-1k-token rate.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    usd_per_1k_tokens: f64,
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self {
            usd_per_1k_tokens: 0.002,
        }
    }
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationHandler for EchoHandler {
    async fn execute(
        &self,
        context: &ExecutionContext,
        selection: &ModelSelection,
    ) -> Result<OperationOutput> {
        let tokens = context.operation.estimated_input_tokens;
        Ok(OperationOutput {
            result: json!({
                "operation_id": context.operation.operation_id,
                "operation_type": context.operation.operation_type,
                "model": selection.to_string(),
                "echo": context.operation.payload,
            }),
            tokens_used: tokens,
            cost_usd: tokens as f64 / 1000.0 * self.usd_per_1k_tokens,
        })
    }
}
