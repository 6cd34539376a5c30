//! Run driver
//!
//! Builds a fresh [`CompiledGraph`] for every run from the agent suite and
//! the run's resolved configuration, then invokes, streams or resumes it.
//!
//! Graph shape:
//!
//! ```text
//!   supervisor ──(router label)──▶ specialist ──▶ END
//!        └──────────("end")──────────────────────▶ END
//! ```

use crate::agents::{
    AgentNode, AgentSuite, DefaultStateFactory, NodeContext, StateFactory, END_LABEL,
};
use crate::config::create_agent_config;
use crate::executor::RemoteCommandExecutor;
use crate::spawner::ModelSpawner;
use crate::state::OrchestratorState;
use crate::{OrchestratorError, Result};
use futures::StreamExt;
use helix_checkpoint::CheckpointSaver;
use helix_graph::{CompiledGraph, RunConfig, StateGraph, END};
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Node name of the supervisor
pub const SUPERVISOR_NODE: &str = "supervisor";

const DEFAULT_USER: &str = "anonymous";

/// Per-run inputs
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Partial agent configuration merged over the defaults
    pub config: Option<Value>,
    /// Thread to run under; a fresh UUID when absent
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
    pub checkpointer: Option<Arc<dyn CheckpointSaver<OrchestratorState>>>,
    pub executor: Option<Arc<dyn RemoteCommandExecutor>>,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("config", &self.config)
            .field("thread_id", &self.thread_id)
            .field("user_id", &self.user_id)
            .field("checkpointer", &self.checkpointer.is_some())
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

impl RunOptions {
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_checkpointer(
        mut self,
        checkpointer: Arc<dyn CheckpointSaver<OrchestratorState>>,
    ) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn RemoteCommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }
}

/// Observer handed to [`Orchestrator::stream`]; `Break` stops the run
pub type StepCallback<'a> = dyn FnMut(&str, &OrchestratorState) -> ControlFlow<()> + Send + 'a;

/// Final state of a run and the thread it ran under
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub thread_id: String,
    pub state: OrchestratorState,
    /// Set when a step callback broke off the run before the graph finished
    pub stopped_early: bool,
}

/// One side of [`Orchestrator::compare_execution_paths`]
pub type ExecutionPath = RunOutcome;

/// Two runs of the same task under different configurations
#[derive(Debug, Clone)]
pub struct ExecutionComparison {
    pub path1: ExecutionPath,
    pub path2: ExecutionPath,
}

/// Drives the supervisor graph
#[derive(Clone)]
pub struct Orchestrator {
    suite: AgentSuite,
    state_factory: Arc<dyn StateFactory>,
    spawner: Option<Arc<ModelSpawner>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("suite", &self.suite)
            .field("spawner", &self.spawner.is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(suite: AgentSuite, state_factory: Arc<dyn StateFactory>) -> Self {
        Self {
            suite,
            state_factory,
            spawner: None,
        }
    }

    /// Reference agents with every run starting from `budget_cents`
    pub fn reference(budget_cents: u64) -> Self {
        Self::new(
            AgentSuite::reference(),
            Arc::new(DefaultStateFactory::new(budget_cents)),
        )
    }

    /// Share `spawner` with every run's nodes
    pub fn with_spawner(mut self, spawner: Arc<ModelSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn suite(&self) -> &AgentSuite {
        &self.suite
    }

    pub fn spawner(&self) -> Option<&Arc<ModelSpawner>> {
        self.spawner.as_ref()
    }

    /// Run `task` to completion and return the final state
    pub async fn run(&self, task: &str, options: RunOptions) -> Result<OrchestratorState> {
        Ok(self.run_detailed(task, options).await?.state)
    }

    /// Like [`run`](Self::run), also reporting the thread id used
    #[tracing::instrument(skip(self, options), fields(thread_id = tracing::field::Empty))]
    pub async fn run_detailed(&self, task: &str, options: RunOptions) -> Result<RunOutcome> {
        let thread_id = options.thread_id.clone().unwrap_or_else(new_thread_id);
        tracing::Span::current().record("thread_id", thread_id.as_str());

        let graph = self.compile(&options, &thread_id)?;
        let initial = self.state_factory.create_initial_state(task).await?;

        info!("Starting orchestration run");
        let state = graph
            .invoke_with_config(initial, RunConfig::for_thread(&thread_id))
            .await
            .map_err(|e| {
                error!(error = %e, "Orchestration run failed");
                OrchestratorError::from(e)
            })?;
        info!(
            messages = state.messages().len(),
            spent_cents = state.spent_cents(),
            "Orchestration run completed"
        );
        Ok(RunOutcome {
            thread_id,
            state,
            stopped_early: false,
        })
    }

    /// Run `task`, calling `on_step` with the node name and state after
    /// every completed node
    ///
    /// The returned state equals what [`run`](Self::run) would produce for
    /// the same inputs. If `on_step` returns `ControlFlow::Break`, no further
    /// node runs and the state after the last completed node is returned.
    /// Checkpoints already written stay valid for [`resume`](Self::resume).
    pub async fn stream(
        &self,
        task: &str,
        on_step: Option<&mut StepCallback<'_>>,
        options: RunOptions,
    ) -> Result<OrchestratorState> {
        Ok(self.stream_detailed(task, on_step, options).await?.state)
    }

    #[tracing::instrument(skip(self, on_step, options), fields(thread_id = tracing::field::Empty))]
    pub async fn stream_detailed(
        &self,
        task: &str,
        mut on_step: Option<&mut StepCallback<'_>>,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        let thread_id = options.thread_id.clone().unwrap_or_else(new_thread_id);
        tracing::Span::current().record("thread_id", thread_id.as_str());

        let graph = self.compile(&options, &thread_id)?;
        let initial = self.state_factory.create_initial_state(task).await?;

        info!("Starting streamed orchestration run");
        let mut state = initial.clone();
        let mut stopped_early = false;
        let mut steps = graph.stream_with_config(initial, RunConfig::for_thread(&thread_id));
        while let Some(event) = steps.next().await {
            let event = event.map_err(|e| {
                error!(error = %e, "Streamed orchestration run failed");
                OrchestratorError::from(e)
            })?;
            let flow = match on_step.as_deref_mut() {
                Some(callback) => callback(&event.node, &event.state),
                None => ControlFlow::Continue(()),
            };
            state = event.state;
            if flow.is_break() {
                info!(node = %event.node, "Streamed orchestration stopped by step callback");
                stopped_early = true;
                break;
            }
        }
        Ok(RunOutcome {
            thread_id,
            state,
            stopped_early,
        })
    }

    /// Continue from a stored checkpoint on that checkpoint's thread
    ///
    /// Fails with [`OrchestratorError::CheckpointerRequired`] before any
    /// lookup when `options` carries no checkpointer.
    #[tracing::instrument(skip(self, options))]
    pub async fn resume(
        &self,
        checkpoint_id: &str,
        options: RunOptions,
    ) -> Result<OrchestratorState> {
        let checkpointer = options
            .checkpointer
            .clone()
            .ok_or(OrchestratorError::CheckpointerRequired)?;
        let checkpoint = checkpointer
            .load_by_checkpoint_id(checkpoint_id)
            .await?
            .ok_or_else(|| OrchestratorError::CheckpointNotFound(checkpoint_id.to_string()))?;

        let thread_id = checkpoint.thread_id;
        let graph = self.compile(&options, &thread_id)?;
        info!(thread_id = %thread_id, sequence = checkpoint.sequence, "Resuming orchestration run");
        let state = graph
            .invoke_with_config(checkpoint.state, RunConfig::for_thread(&thread_id))
            .await?;
        Ok(state)
    }

    /// Every checkpointed state of `thread_id`, oldest first
    pub async fn get_execution_history(
        &self,
        thread_id: &str,
        checkpointer: &dyn CheckpointSaver<OrchestratorState>,
    ) -> Result<Vec<OrchestratorState>> {
        let history = checkpointer.history(thread_id).await?;
        Ok(history.into_iter().map(|c| c.state).collect())
    }

    /// Run `task` twice concurrently, once per configuration, each on a
    /// fresh thread
    ///
    /// Any thread id in `options` is ignored. Either run failing fails the
    /// comparison.
    #[tracing::instrument(skip(self, config_a, config_b, options))]
    pub async fn compare_execution_paths(
        &self,
        task: &str,
        config_a: Value,
        config_b: Value,
        options: RunOptions,
    ) -> Result<ExecutionComparison> {
        let mut options_a = options.clone().with_config(config_a);
        options_a.thread_id = None;
        let mut options_b = options.with_config(config_b);
        options_b.thread_id = None;

        let (path1, path2) = tokio::try_join!(
            self.run_detailed(task, options_a),
            self.run_detailed(task, options_b)
        )?;
        Ok(ExecutionComparison { path1, path2 })
    }

    fn compile(
        &self,
        options: &RunOptions,
        thread_id: &str,
    ) -> Result<CompiledGraph<OrchestratorState>> {
        let config = create_agent_config(options.config.as_ref())?;
        let max_steps = config.max_steps;
        let node_timeout = config.node_timeout();
        let checkpointer = options
            .checkpointer
            .clone()
            .filter(|_| config.enable_checkpointing);

        let ctx = Arc::new(NodeContext {
            config: Arc::new(config),
            thread_id: thread_id.to_string(),
            user_id: options
                .user_id
                .clone()
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            spawner: self.spawner.clone(),
            executor: options.executor.clone(),
            checkpointer: checkpointer.clone(),
        });

        let mut graph = self.build_graph(&ctx)?.with_max_steps(max_steps);
        if let Some(timeout) = node_timeout {
            graph = graph.with_node_timeout(timeout);
        }
        if let Some(saver) = checkpointer {
            graph = graph.with_checkpointer(saver);
        }
        Ok(graph)
    }

    fn build_graph(&self, ctx: &Arc<NodeContext>) -> Result<CompiledGraph<OrchestratorState>> {
        let mut graph = StateGraph::new();
        add_agent(&mut graph, SUPERVISOR_NODE, &self.suite.supervisor, ctx);

        let mut branches: Vec<(String, String)> =
            Vec::with_capacity(self.suite.specialists.len() + 1);
        for specialist in &self.suite.specialists {
            if specialist.label == END_LABEL || specialist.label == SUPERVISOR_NODE {
                return Err(OrchestratorError::invalid_config(format!(
                    "specialist label '{}' is reserved",
                    specialist.label
                )));
            }
            add_agent(&mut graph, specialist.label.as_str(), &specialist.node, ctx);
            graph.add_edge(specialist.label.as_str(), END);
            branches.push((specialist.label.clone(), specialist.label.clone()));
        }
        branches.push((END_LABEL.to_string(), END.to_string()));

        let router = Arc::clone(&self.suite.router);
        graph
            .set_entry(SUPERVISOR_NODE)
            .add_conditional_edge(
                SUPERVISOR_NODE,
                move |state: &OrchestratorState| router.select(state),
                branches,
            );

        Ok(graph.compile()?)
    }
}

fn add_agent(
    graph: &mut StateGraph<OrchestratorState>,
    name: &str,
    agent: &Arc<dyn AgentNode>,
    ctx: &Arc<NodeContext>,
) {
    let agent = Arc::clone(agent);
    let ctx = Arc::clone(ctx);
    graph.add_node(name, move |state: OrchestratorState| {
        let agent = Arc::clone(&agent);
        let ctx = Arc::clone(&ctx);
        async move { agent.run(state, &ctx).await }
    });
}

fn new_thread_id() -> String {
    Uuid::new_v4().to_string()
}
