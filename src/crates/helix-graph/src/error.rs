//! Error types for graph construction and execution
//!
//! ```text
//! GraphError
//! ├── Validation         - structure rejected by compile()
//! ├── UnknownRoute       - router returned a label with no branch
//! ├── StepLimitExceeded  - run did not reach END within max_steps
//! ├── NodeExecution      - node function returned an error
//! ├── NodeTimeout        - node exceeded the per-node timeout
//! └── Checkpoint         - saving a step checkpoint failed
//! ```
//!
//! Every variant except `Validation` is fatal to the run that raised it;
//! there is no fallback route and no partial result.

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while compiling or running a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by `compile()` only, never during a run.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A conditional edge produced a label that is not in its branch map
    #[error("Node '{node}' routed to unknown label '{label}'")]
    UnknownRoute {
        /// Node whose conditional edge was evaluated
        node: String,
        /// Label returned by the router
        label: String,
    },

    /// The run executed `max_steps` nodes without reaching END
    #[error("Maximum steps exceeded: {max_steps}")]
    StepLimitExceeded {
        /// Configured limit
        max_steps: usize,
    },

    /// Node execution failed with context
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// Node did not finish within the configured timeout
    #[error("Node '{node}' timed out after {timeout_ms}ms")]
    NodeTimeout {
        /// Name of the node that timed out
        node: String,
        /// Timeout that was exceeded
        timeout_ms: u64,
    },

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] helix_checkpoint::CheckpointError),
}

impl GraphError {
    /// Create a node execution error with context
    ///
    /// ```rust
    /// use helix_graph::GraphError;
    ///
    /// let err = GraphError::node_execution("action", "ledger unavailable");
    /// assert_eq!(err.to_string(), "Node 'action' execution failed: ledger unavailable");
    /// ```
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create an unknown-route error
    pub fn unknown_route(node: impl Into<String>, label: impl Into<String>) -> Self {
        Self::UnknownRoute {
            node: node.into(),
            label: label.into(),
        }
    }
}
