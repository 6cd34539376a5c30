//! # helix-orchestrator
//!
//! Supervisor/specialist orchestration on top of [`helix_graph`], with
//! checkpointed runs from [`helix_checkpoint`] and a budget-gated spawner
//! for downstream model operations.
//!
//! ```text
//!   Orchestrator::run ──▶ CompiledGraph ──▶ supervisor ──▶ specialist ──▶ END
//!                              │                              │
//!                              ▼                              ▼ (action)
//!                       CheckpointSaver                  ModelSpawner
//!                                                     (audit / ledger / router)
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use helix_orchestrator::{Orchestrator, RunOptions};
//!
//! # async fn example() -> helix_orchestrator::Result<()> {
//! let orchestrator = Orchestrator::reference(1_000);
//! let state = orchestrator.run("tell me a story", RunOptions::default()).await?;
//! println!("{} messages", state.messages().len());
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod agents;
pub mod config;
pub mod driver;
pub mod executor;
pub mod spawner;
pub mod state;
pub mod telemetry;

pub use agents::{
    AgentNode, AgentSuite, DefaultStateFactory, NextLabelRouter, NodeContext,
    RouteSelector, StateFactory,
};
pub use config::{
    create_agent_config, AgentRole, ApprovalMode, ModelConfig, OrchestratorConfig, Provider,
};
pub use driver::{
    ExecutionComparison, ExecutionPath, Orchestrator, RunOptions, RunOutcome, StepCallback,
};
pub use executor::{
    CommandRequest, CommandTicket, InMemoryCommandQueue, QueueStatus, RemoteCommandExecutor,
};
pub use spawner::{
    BudgetGate, ExecutionContext, ModelSelection, ModelSpawner, ModelStatus, Operation,
    OperationType, SpawnResult, SpawnedModel,
};
pub use state::{Message, OrchestratorState, Role};

/// Orchestrator error types
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// One or more agent roles resolved to nothing
    #[error("Missing agent configuration for role(s): {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    /// Configuration present but malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resume was requested without a checkpoint store
    #[error("A checkpointer is required to resume a run")]
    CheckpointerRequired,

    /// Resume target does not exist
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Graph build or execution failure
    #[error("Graph error: {0}")]
    Graph(#[from] helix_graph::GraphError),

    /// Checkpoint store failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] helix_checkpoint::CheckpointError),

    /// Spend exceeds what is left of the run budget
    #[error("Budget exceeded: requested {requested} cents, {remaining} cents remaining")]
    Budget { requested: u64, remaining: u64 },

    /// Operation execution failure
    #[error("Operation failed: {0}")]
    Operation(String),

    /// A spawned model was asked to move to a state it cannot reach
    #[error("Illegal transition for model {model_id}: {from} -> {to}")]
    InvalidTransition {
        model_id: String,
        from: String,
        to: String,
    },

    /// An external collaborator (router, ledger, audit log, executor) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Create an operation error
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a collaborator error
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Create an invalid-config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
