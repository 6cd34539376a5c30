//! CompiledGraph struct and builder methods

use crate::graph::Graph;
use helix_checkpoint::{CheckpointSaver, CheckpointState};
use std::sync::Arc;
use std::time::Duration;

/// Step guard applied when none is configured
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Per-run settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Thread to checkpoint under. Without one, no checkpoints are written
    /// even if a checkpointer is attached.
    pub thread_id: Option<String>,
}

impl RunConfig {
    /// Config that checkpoints under `thread_id`
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
        }
    }
}

/// Compiled graph ready for execution
pub struct CompiledGraph<S> {
    pub(crate) graph: Arc<Graph<S>>,
    pub(crate) checkpoint_saver: Option<Arc<dyn CheckpointSaver<S>>>,
    pub(crate) max_steps: usize,
    pub(crate) node_timeout: Option<Duration>,
}

impl<S> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            checkpoint_saver: self.checkpoint_saver.clone(),
            max_steps: self.max_steps,
            node_timeout: self.node_timeout,
        }
    }
}

impl<S> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("graph", &self.graph)
            .field("checkpointing", &self.checkpoint_saver.is_some())
            .field("max_steps", &self.max_steps)
            .field("node_timeout", &self.node_timeout)
            .finish()
    }
}

impl<S: CheckpointState> CompiledGraph<S> {
    /// Wrap an already validated graph
    pub(crate) fn new(graph: Graph<S>) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpoint_saver: None,
            max_steps: DEFAULT_MAX_STEPS,
            node_timeout: None,
        }
    }

    /// Set the checkpoint saver
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver<S>>) -> Self {
        self.checkpoint_saver = Some(saver);
        self
    }

    /// Set the maximum number of node executions per run
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Bound the wall-clock time of every node execution
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    /// Get a reference to the underlying graph
    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Entry node name
    pub fn entry(&self) -> &str {
        self.graph.entry.as_deref().unwrap_or_default()
    }

    /// Node names in sorted order
    pub fn node_names(&self) -> Vec<&str> {
        self.graph.node_names()
    }

    /// Configured step guard
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Whether a checkpoint saver is attached
    pub fn has_checkpointer(&self) -> bool {
        self.checkpoint_saver.is_some()
    }
}
