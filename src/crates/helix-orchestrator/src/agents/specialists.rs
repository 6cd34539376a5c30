use super::{AgentNode, NodeContext};
use crate::config::{AgentRole, ApprovalMode};
use crate::executor::CommandRequest;
use crate::spawner::{BudgetGate, Operation, OperationType};
use crate::state::{Message, OrchestratorState};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;

/// Specialist that answers with one attributed message and no side effects
#[derive(Debug, Clone, Copy)]
pub struct EchoAgent {
    role: AgentRole,
}

impl EchoAgent {
    pub fn new(role: AgentRole) -> Self {
        Self { role }
    }
}

#[async_trait]
impl AgentNode for EchoAgent {
    async fn run(
        &self,
        mut state: OrchestratorState,
        ctx: &NodeContext,
    ) -> Result<OrchestratorState> {
        let model = ctx.config.model_for(self.role);
        let content = format!(
            "[{}/{}] {} response to: {}",
            model.provider,
            model.model,
            self.role.label(),
            state.task()
        );
        state.push_message(Message::assistant(self.role.config_key(), content));
        state.clear_route();
        Ok(state)
    }
}

/// Specialist that turns the task into a spawned operation
///
/// The operation is submitted to the run's spawner under the configured
/// approval mode. In `budget_gated` mode the spawner sees the remaining
/// budget and may decline; in `unrestricted` mode it always proceeds and
/// the spend is clamped at zero remaining. A committed estimate is deducted
/// from the state and never refunded. With a remote executor wired, an
/// accepted operation also queues one command.
#[derive(Debug, Clone)]
pub struct ActionAgent {
    operation_type: OperationType,
    estimated_cost_cents: u64,
}

impl Default for ActionAgent {
    fn default() -> Self {
        Self::new(OperationType::ToolUse, 50)
    }
}

impl ActionAgent {
    pub fn new(operation_type: OperationType, estimated_cost_cents: u64) -> Self {
        Self {
            operation_type,
            estimated_cost_cents,
        }
    }

    fn operation(&self, state: &OrchestratorState) -> Operation {
        // Rough token estimate: four characters per token.
        let tokens = (state.task().len() as u64).div_ceil(4);
        Operation::new(self.operation_type, self.estimated_cost_cents)
            .with_input_tokens(tokens)
            .with_payload(json!({ "task": state.task() }))
    }
}

const NAME: &str = "actionAgent";

#[async_trait]
impl AgentNode for ActionAgent {
    async fn run(
        &self,
        mut state: OrchestratorState,
        ctx: &NodeContext,
    ) -> Result<OrchestratorState> {
        state.clear_route();

        let Some(spawner) = &ctx.spawner else {
            state.push_message(Message::assistant(
                NAME,
                format!("no spawner configured; '{}' recorded only", state.task()),
            ));
            return Ok(state);
        };

        let operation = self.operation(&state);
        let budget = state.budget_remaining_cents();
        let gate = match ctx.config.approval_mode {
            ApprovalMode::BudgetGated => BudgetGate::Enforce,
            ApprovalMode::Unrestricted => BudgetGate::Bypass,
        };
        let snapshot = json!({
            "thread_id": ctx.thread_id,
            "task": state.task(),
            "budget_remaining_cents": state.budget_remaining_cents(),
        });
        let result = spawner
            .spawn_gated(&ctx.user_id, operation, budget, Some(snapshot), gate)
            .await;

        if result.is_declined() {
            tracing::info!(
                thread_id = %ctx.thread_id,
                estimated_cents = self.estimated_cost_cents,
                remaining_cents = state.budget_remaining_cents(),
                "Action declined by budget"
            );
            state.push_message(Message::assistant(
                NAME,
                format!(
                    "declined: estimated {} cents exceeds remaining {} cents",
                    self.estimated_cost_cents,
                    state.budget_remaining_cents()
                ),
            ));
            return Ok(state);
        }

        match ctx.config.approval_mode {
            ApprovalMode::BudgetGated => state.try_spend(result.total_cost_cents)?,
            ApprovalMode::Unrestricted => {
                state.spend_saturating(result.total_cost_cents);
            }
        }
        let models: Vec<String> = result
            .spawned_models
            .iter()
            .map(|m| format!("{} ({})", m.model_id, m.model_selection))
            .collect();
        state.push_message(Message::assistant(
            NAME,
            format!(
                "spawned {} for {} cents",
                models.join(", "),
                result.total_cost_cents
            ),
        ));

        if let Some(executor) = &ctx.executor {
            let model_ids: Vec<&str> = result
                .spawned_models
                .iter()
                .map(|m| m.model_id.as_str())
                .collect();
            let request = CommandRequest::new(self.operation_type.as_str(), ctx.user_id.clone())
                .with_args(json!({
                    "task": state.task(),
                    "thread_id": ctx.thread_id,
                    "model_ids": model_ids,
                }));
            let ticket = executor.queue_command(request).await?;
            state.push_message(Message::tool(
                "remoteExecutor",
                format!(
                    "queued command {} at position {}",
                    ticket.command_id, ticket.position
                ),
            ));
        }

        Ok(state)
    }
}
