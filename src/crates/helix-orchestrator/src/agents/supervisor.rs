use super::{AgentNode, NodeContext, END_LABEL};
use crate::config::AgentRole;
use crate::state::{Message, OrchestratorState};
use crate::Result;
use async_trait::async_trait;

/// Routes a task to a specialist by keyword
///
/// Checks the action, memory and purpose keyword lists in that order and
/// falls back to the narrative agent. A blank task routes to `end`.
#[derive(Debug, Clone)]
pub struct SupervisorAgent {
    rules: Vec<(AgentRole, Vec<String>)>,
}

impl Default for SupervisorAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorAgent {
    pub fn new() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        Self {
            rules: vec![
                (
                    AgentRole::Action,
                    words(&[
                        "plan", "book", "schedule", "send", "buy", "order", "run", "execute",
                        "deploy",
                    ]),
                ),
                (
                    AgentRole::Memory,
                    words(&["remember", "recall", "history", "earlier", "last time", "forget"]),
                ),
                (
                    AgentRole::Purpose,
                    words(&["why", "goal", "purpose", "value", "meaning", "priority"]),
                ),
            ],
        }
    }

    /// Label the task routes to
    pub fn classify(&self, task: &str) -> &'static str {
        let task = task.to_lowercase();
        if task.trim().is_empty() {
            return END_LABEL;
        }
        let tokens: Vec<&str> = task
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        self.rules
            .iter()
            .find(|(_, keywords)| {
                keywords.iter().any(|k| {
                    if k.contains(' ') {
                        task.contains(k.as_str())
                    } else {
                        tokens.contains(&k.as_str())
                    }
                })
            })
            .map_or(AgentRole::Narrative.label(), |(role, _)| role.label())
    }
}

#[async_trait]
impl AgentNode for SupervisorAgent {
    async fn run(
        &self,
        mut state: OrchestratorState,
        ctx: &NodeContext,
    ) -> Result<OrchestratorState> {
        let label = self.classify(state.task());
        let model = ctx.config.model_for(AgentRole::Supervisor);
        tracing::debug!(
            thread_id = %ctx.thread_id,
            label,
            model = %model.model,
            "Supervisor routed task"
        );

        state.route_to(label);
        state.push_message(Message::assistant(
            AgentRole::Supervisor.config_key(),
            format!("routing to {}", label),
        ));
        Ok(state)
    }
}
