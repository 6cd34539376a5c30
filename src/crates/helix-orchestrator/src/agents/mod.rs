//! Agent nodes and the seams the driver plugs them into
//!
//! The driver builds one graph node per agent and hands every node the same
//! [`NodeContext`]: resolved config, run identity, and whichever
//! collaborators this run was given. Agents never reach for globals.

mod specialists;
mod supervisor;

pub use specialists::{ActionAgent, EchoAgent};
pub use supervisor::SupervisorAgent;

use crate::config::{AgentRole, OrchestratorConfig};
use crate::executor::RemoteCommandExecutor;
use crate::spawner::ModelSpawner;
use crate::state::{Message, OrchestratorState};
use crate::{OrchestratorError, Result};
use async_trait::async_trait;
use helix_checkpoint::CheckpointSaver;
use std::sync::Arc;

/// Routing label that finishes the run
pub const END_LABEL: &str = "end";

/// Per-run collaborators handed to every node
#[derive(Clone)]
pub struct NodeContext {
    pub config: Arc<OrchestratorConfig>,
    pub thread_id: String,
    pub user_id: String,
    pub spawner: Option<Arc<ModelSpawner>>,
    pub executor: Option<Arc<dyn RemoteCommandExecutor>>,
    pub checkpointer: Option<Arc<dyn CheckpointSaver<OrchestratorState>>>,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("thread_id", &self.thread_id)
            .field("user_id", &self.user_id)
            .field("spawner", &self.spawner.is_some())
            .field("executor", &self.executor.is_some())
            .field("checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

impl NodeContext {
    /// Context with no collaborators attached
    pub fn new(config: OrchestratorConfig, thread_id: impl Into<String>) -> Self {
        Self {
            config: Arc::new(config),
            thread_id: thread_id.into(),
            user_id: "anonymous".to_string(),
            spawner: None,
            executor: None,
            checkpointer: None,
        }
    }
}

/// One node of the orchestration graph
#[async_trait]
pub trait AgentNode: Send + Sync {
    async fn run(&self, state: OrchestratorState, ctx: &NodeContext)
        -> Result<OrchestratorState>;
}

/// Picks the supervisor's outgoing branch
pub trait RouteSelector: Send + Sync {
    fn select(&self, state: &OrchestratorState) -> String;
}

impl<F> RouteSelector for F
where
    F: Fn(&OrchestratorState) -> String + Send + Sync,
{
    fn select(&self, state: &OrchestratorState) -> String {
        self(state)
    }
}

/// Follows the label the supervisor wrote to `state.next`
#[derive(Debug, Clone, Copy, Default)]
pub struct NextLabelRouter;

impl RouteSelector for NextLabelRouter {
    fn select(&self, state: &OrchestratorState) -> String {
        state.next().unwrap_or(END_LABEL).to_string()
    }
}

/// Builds the state a run starts from
#[async_trait]
pub trait StateFactory: Send + Sync {
    async fn create_initial_state(&self, task: &str) -> Result<OrchestratorState>;
}

/// Fixed budget, task recorded as the first user message
#[derive(Debug, Clone, Copy)]
pub struct DefaultStateFactory {
    pub budget_cents: u64,
}

impl DefaultStateFactory {
    pub fn new(budget_cents: u64) -> Self {
        Self { budget_cents }
    }
}

#[async_trait]
impl StateFactory for DefaultStateFactory {
    async fn create_initial_state(&self, task: &str) -> Result<OrchestratorState> {
        if task.trim().is_empty() {
            return Err(OrchestratorError::invalid_config("task cannot be empty"));
        }
        Ok(OrchestratorState::new(task, self.budget_cents).with_message(Message::user(task)))
    }
}

/// A specialist node and the label routing to it
#[derive(Clone)]
pub struct Specialist {
    pub label: String,
    pub node: Arc<dyn AgentNode>,
}

/// Supervisor, router and specialists of one orchestrator
#[derive(Clone)]
pub struct AgentSuite {
    pub supervisor: Arc<dyn AgentNode>,
    pub router: Arc<dyn RouteSelector>,
    pub specialists: Vec<Specialist>,
}

impl std::fmt::Debug for AgentSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.specialists.iter().map(|s| s.label.as_str()).collect();
        f.debug_struct("AgentSuite")
            .field("specialists", &labels)
            .finish()
    }
}

impl AgentSuite {
    /// Suite with no specialists yet
    pub fn new(supervisor: Arc<dyn AgentNode>, router: Arc<dyn RouteSelector>) -> Self {
        Self {
            supervisor,
            router,
            specialists: Vec::new(),
        }
    }

    /// Register a specialist under `label`. A later registration of the same
    /// label replaces the earlier one.
    pub fn with_specialist(
        mut self,
        label: impl Into<String>,
        node: Arc<dyn AgentNode>,
    ) -> Self {
        let label = label.into();
        self.specialists.retain(|s| s.label != label);
        self.specialists.push(Specialist { label, node });
        self
    }

    /// Keyword supervisor, echo agents for narrative, memory and purpose,
    /// and the budget-gated action agent
    pub fn reference() -> Self {
        let mut suite = Self::new(Arc::new(SupervisorAgent::new()), Arc::new(NextLabelRouter));
        for role in [AgentRole::Narrative, AgentRole::Memory, AgentRole::Purpose] {
            suite = suite.with_specialist(role.label(), Arc::new(EchoAgent::new(role)));
        }
        suite.with_specialist(AgentRole::Action.label(), Arc::new(ActionAgent::default()))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.specialists.iter().map(|s| s.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_label_router() {
        let mut state = OrchestratorState::new("t", 0);
        assert_eq!(NextLabelRouter.select(&state), END_LABEL);
        state.route_to("memory");
        assert_eq!(NextLabelRouter.select(&state), "memory");
    }

    #[test]
    fn test_closure_router() {
        let router: Arc<dyn RouteSelector> =
            Arc::new(|_: &OrchestratorState| "purpose".to_string());
        assert_eq!(router.select(&OrchestratorState::new("t", 0)), "purpose");
    }

    #[tokio::test]
    async fn test_default_state_factory() {
        let state = DefaultStateFactory::new(750)
            .create_initial_state("plan trip")
            .await
            .unwrap();
        assert_eq!(state.budget_cents(), 750);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].content, "plan trip");

        assert!(DefaultStateFactory::new(1).create_initial_state("  ").await.is_err());
    }

    #[test]
    fn test_reference_suite_labels() {
        let suite = AgentSuite::reference();
        assert_eq!(suite.labels(), vec!["narrative", "memory", "purpose", "action"]);

        let suite =
            suite.with_specialist("memory", Arc::new(EchoAgent::new(AgentRole::Memory)));
        assert_eq!(suite.labels(), vec!["narrative", "purpose", "action", "memory"]);
    }
}
