//! Budget-gated model spawner
//!
//! [`ModelSpawner::spawn`] decides whether an operation fits in the
//! remaining budget. If it does, the spawner registers a model for it,
//! reports the spend to the audit log and cost ledger without waiting on
//! them, starts the operation on a background task and returns at once.
//!
//! ```text
//!  spawn ──▶ budget check ──declined──▶ SpawnResult::declined()
//!                │
//!                ▼
//!          ModelRouter::route (fallback on error)
//!                │
//!                ▼
//!          registry: pending ──▶ audit / ledger (detached)
//!                │
//!                ▼
//!          background task: running ──▶ completed | failed
//! ```
//!
//! Every background task lives in one `JoinSet`, so [`ModelSpawner::wait_idle`]
//! can drain them and [`ModelSpawner::shutdown`] can abort them.

pub mod collaborators;
pub mod handlers;
pub mod operation;
pub mod registry;

pub use collaborators::{
    AuditEvent, AuditLog, AuditRecord, CostLedger, CostRecord, InMemoryAuditLog,
    InMemoryCostLedger, ModelRouter, RouteDecision, RouteRequest, StaticModelRouter,
};
pub use handlers::{EchoHandler, HandlerTable, HandlerTableBuilder, OperationHandler};
pub use operation::{
    ExecutionContext, ModelSelection, ModelStatus, Operation, OperationOutput, OperationType,
    SpawnedModel, Transition,
};
pub use registry::SpawnRegistry;

use crate::OrchestratorError;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Outcome of one spawn request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnResult {
    pub spawned_models: Vec<SpawnedModel>,
    /// Budget committed by this request, in cents
    pub total_cost_cents: u64,
    pub success_count: usize,
    pub failed_count: usize,
}

impl SpawnResult {
    /// Result for an operation that did not fit in the budget
    pub fn declined() -> Self {
        Self {
            spawned_models: Vec::new(),
            total_cost_cents: 0,
            success_count: 0,
            failed_count: 0,
        }
    }

    pub fn is_declined(&self) -> bool {
        self.spawned_models.is_empty()
    }
}

/// Longest an audit or ledger write may take before it is abandoned
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a spawn request is checked against the remaining budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetGate {
    /// Decline when the estimate exceeds the remaining budget
    Enforce,
    /// Proceed regardless; the recorded remainder saturates at zero
    Bypass,
}

/// Spawns and tracks model executions
pub struct ModelSpawner {
    registry: Arc<SpawnRegistry>,
    router: Arc<dyn ModelRouter>,
    ledger: Arc<dyn CostLedger>,
    audit: Arc<dyn AuditLog>,
    handlers: Arc<HandlerTable>,
    default_selection: ModelSelection,
    report_timeout: Duration,
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for ModelSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpawner")
            .field("tracked_models", &self.registry.len())
            .field("handlers", &self.handlers)
            .field("default_selection", &self.default_selection)
            .finish()
    }
}

impl ModelSpawner {
    pub fn new(
        router: Arc<dyn ModelRouter>,
        ledger: Arc<dyn CostLedger>,
        audit: Arc<dyn AuditLog>,
        handlers: HandlerTable,
        default_selection: ModelSelection,
    ) -> Self {
        Self {
            registry: Arc::new(SpawnRegistry::new()),
            router,
            ledger,
            audit,
            handlers: Arc::new(handlers),
            default_selection,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Bound on each detached audit and ledger write
    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    /// Spawner wired to the in-memory collaborators and [`EchoHandler`]
    pub fn in_memory(default_selection: ModelSelection) -> Self {
        Self::new(
            Arc::new(StaticModelRouter::new(default_selection.clone())),
            Arc::new(InMemoryCostLedger::new()),
            Arc::new(InMemoryAuditLog::new()),
            HandlerTable::uniform(Arc::new(EchoHandler::new())),
            default_selection,
        )
    }

    /// Spawn `operation` if it fits in `budget_remaining` cents
    pub async fn spawn(
        &self,
        user_id: &str,
        operation: Operation,
        budget_remaining: u64,
    ) -> SpawnResult {
        self.spawn_with_context(user_id, operation, budget_remaining, None)
            .await
    }

    /// [`spawn`](Self::spawn) with an upstream state snapshot for the handler
    pub async fn spawn_with_context(
        &self,
        user_id: &str,
        operation: Operation,
        budget_remaining: u64,
        context: Option<Value>,
    ) -> SpawnResult {
        self.spawn_gated(user_id, operation, budget_remaining, context, BudgetGate::Enforce)
            .await
    }

    /// Spawn `operation` even if it does not fit in `budget_remaining`
    ///
    /// The execution context and audit trail still carry the real remainder,
    /// clamped at zero.
    pub async fn spawn_unbounded(
        &self,
        user_id: &str,
        operation: Operation,
        budget_remaining: u64,
        context: Option<Value>,
    ) -> SpawnResult {
        self.spawn_gated(user_id, operation, budget_remaining, context, BudgetGate::Bypass)
            .await
    }

    /// Register and start `operation`, checking the budget only under
    /// [`BudgetGate::Enforce`]
    #[tracing::instrument(
        skip(self, operation, context),
        fields(
            operation_id = %operation.operation_id,
            operation_type = %operation.operation_type,
            estimated_cost = operation.estimated_cost,
        )
    )]
    pub async fn spawn_gated(
        &self,
        user_id: &str,
        operation: Operation,
        budget_remaining: u64,
        context: Option<Value>,
        gate: BudgetGate,
    ) -> SpawnResult {
        if gate == BudgetGate::Enforce && budget_remaining < operation.estimated_cost {
            tracing::info!(budget_remaining, "Operation declined: estimate exceeds budget");
            return SpawnResult::declined();
        }

        let model_id = Uuid::new_v4().to_string();
        let request = RouteRequest {
            operation_id: operation.operation_id.clone(),
            operation_type: operation.operation_type,
            user_id: user_id.to_string(),
            estimated_input_tokens: operation.estimated_input_tokens,
        };
        let (selection, estimated_cost_usd) = match self.router.route(&request).await {
            Ok(decision) => (decision.selection, decision.estimated_cost_usd),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.default_selection,
                    "Model routing failed"
                );
                (self.default_selection.clone(), 0.0)
            }
        };

        let model = SpawnedModel::pending(&model_id, &operation, selection.clone());
        let exec_context = ExecutionContext {
            model_id: model_id.clone(),
            user_id: user_id.to_string(),
            context,
            budget_remaining: budget_remaining.saturating_sub(operation.estimated_cost),
            operation,
        };
        self.registry.register(model.clone(), exec_context.clone());
        tracing::info!(model_id = %model_id, model = %selection, "Model spawned");

        self.report(&model, &exec_context, estimated_cost_usd, gate);

        let registry = Arc::clone(&self.registry);
        let handlers = Arc::clone(&self.handlers);
        let committed = exec_context.operation.estimated_cost;
        self.track(execute(registry, handlers, exec_context, selection));

        SpawnResult {
            spawned_models: vec![model],
            total_cost_cents: committed,
            success_count: 1,
            failed_count: 0,
        }
    }

    /// Detached audit and ledger writes for a freshly registered model
    ///
    /// Each write is bounded by the report timeout so a stalled sink cannot
    /// hold up [`wait_idle`](Self::wait_idle).
    fn report(
        &self,
        model: &SpawnedModel,
        context: &ExecutionContext,
        estimated_cost_usd: f64,
        gate: BudgetGate,
    ) {
        let timeout = self.report_timeout;
        let audit = Arc::clone(&self.audit);
        let event = AuditEvent::new(
            "model_spawned",
            json!({
                "model_id": model.model_id,
                "operation_id": model.operation_id,
                "operation_type": model.operation_type,
                "model": model.model_selection.to_string(),
                "user_id": context.user_id,
                "estimated_cost_cents": context.operation.estimated_cost,
                "budget_remaining": context.budget_remaining,
                "budget_gated": gate == BudgetGate::Enforce,
            }),
        );
        self.track(async move {
            match tokio::time::timeout(timeout, audit.append(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Audit log write failed"),
                Err(_) => tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Audit log write timed out"
                ),
            }
        });

        let ledger = Arc::clone(&self.ledger);
        let user_id = context.user_id.clone();
        let record = CostRecord {
            operation_id: model.operation_id.clone(),
            operation_type: model.operation_type,
            model_used: model.model_selection.to_string(),
            cost_usd: estimated_cost_usd,
            latency_ms: 0,
            success: true,
            input_tokens: context.operation.estimated_input_tokens,
            output_tokens: 0,
        };
        self.track(async move {
            match tokio::time::timeout(timeout, ledger.log_operation(&user_id, record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Cost ledger write failed"),
                Err(_) => tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Cost ledger write timed out"
                ),
            }
        });
    }

    fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        while let Some(finished) = tasks.try_join_next() {
            log_join_error(finished);
        }
        tasks.spawn(task);
    }

    /// Every tracked model, oldest first
    pub fn get_active_models(&self) -> Vec<SpawnedModel> {
        self.registry.models()
    }

    pub fn get_active_model_count(&self) -> usize {
        self.registry.len()
    }

    pub fn get_execution_contexts(&self) -> Vec<ExecutionContext> {
        self.registry.contexts()
    }

    pub fn get_model(&self, model_id: &str) -> Option<SpawnedModel> {
        self.registry.get(model_id)
    }

    /// Drop completed and failed models. Returns how many were removed.
    pub fn clear_completed_models(&self) -> usize {
        let removed = self.registry.clear_completed();
        tracing::debug!(removed, "Cleared settled models");
        removed
    }

    /// Wait for every in-flight execution and observability write
    pub async fn wait_idle(&self) {
        loop {
            let mut drained = std::mem::take(&mut *self.tasks.lock());
            if drained.is_empty() {
                return;
            }
            while let Some(finished) = drained.join_next().await {
                log_join_error(finished);
            }
        }
    }

    /// Abort in-flight work and fail the models it leaves behind
    pub async fn shutdown(&self) -> usize {
        let mut drained = std::mem::take(&mut *self.tasks.lock());
        drained.abort_all();
        while let Some(finished) = drained.join_next().await {
            if let Err(e) = finished {
                if e.is_panic() {
                    tracing::error!(error = %e, "Spawner task panicked");
                }
            }
        }
        let abandoned = self.registry.abandon_unsettled("spawner shut down");
        tracing::info!(abandoned, "Spawner shut down");
        abandoned
    }
}

fn log_join_error(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            tracing::error!(error = %e, "Spawner task panicked");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

/// Background lifecycle of one spawned model
async fn execute(
    registry: Arc<SpawnRegistry>,
    handlers: Arc<HandlerTable>,
    context: ExecutionContext,
    selection: ModelSelection,
) {
    let model_id = context.model_id.clone();
    if let Err(e) = registry.apply(&model_id, Transition::Started { at: Utc::now() }) {
        tracing::warn!(model_id = %model_id, error = %e, "Model could not start");
        return;
    }

    let operation_type = context.operation.operation_type;
    let outcome = match handlers.get(operation_type) {
        Some(handler) => AssertUnwindSafe(handler.execute(&context, &selection))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(OrchestratorError::operation(panic_message(payload)))),
        None => Err(OrchestratorError::operation(format!(
            "no handler registered for {}",
            operation_type
        ))),
    };

    let transition = match outcome {
        Ok(output) => {
            tracing::debug!(model_id = %model_id, tokens = output.tokens_used, "Model completed");
            Transition::Succeeded {
                output,
                at: Utc::now(),
            }
        }
        Err(e) => {
            tracing::error!(model_id = %model_id, error = %e, "Model execution failed");
            Transition::Failed {
                error: e.to_string(),
                at: Utc::now(),
            }
        }
    };
    if let Err(e) = registry.apply(&model_id, transition) {
        tracing::warn!(model_id = %model_id, error = %e, "Dropped model transition");
    }
}
