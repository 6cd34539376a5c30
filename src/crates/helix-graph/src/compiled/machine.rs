//! The step machine shared by invoke and stream
//!
//! One call to [`StepMachine::advance`] runs exactly one node:
//!
//! 1. refuse if `max_steps` nodes already ran
//! 2. run the node (under the node timeout, if any)
//! 3. save a checkpoint when a saver and a thread id are both present
//! 4. resolve the outgoing edge; a router label missing from the branch map
//!    is an error, [`END`] finishes the run

use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeId, END};
use crate::stream::StepEvent;
use helix_checkpoint::{CheckpointSaver, CheckpointState};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct StepMachine<S> {
    graph: Arc<Graph<S>>,
    checkpoint_saver: Option<Arc<dyn CheckpointSaver<S>>>,
    thread_id: Option<String>,
    max_steps: usize,
    node_timeout: Option<Duration>,
    next: Option<NodeId>,
    state: S,
    steps: usize,
}

impl<S: CheckpointState> StepMachine<S> {
    pub(crate) fn new(compiled: &CompiledGraph<S>, input: S, thread_id: Option<String>) -> Self {
        Self {
            graph: Arc::clone(&compiled.graph),
            checkpoint_saver: compiled.checkpoint_saver.clone(),
            thread_id,
            max_steps: compiled.max_steps,
            node_timeout: compiled.node_timeout,
            next: compiled.graph.entry.clone(),
            state: input,
            steps: 0,
        }
    }

    /// Number of nodes executed so far
    pub(crate) fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn into_state(self) -> S {
        self.state
    }

    /// Run the next node, or return `None` once END was reached
    pub(crate) async fn advance(&mut self) -> Result<Option<StepEvent<S>>> {
        let Some(node) = self.next.take() else {
            return Ok(None);
        };

        if self.steps >= self.max_steps {
            tracing::error!(max_steps = self.max_steps, node = %node, "Step limit exceeded");
            return Err(GraphError::StepLimitExceeded {
                max_steps: self.max_steps,
            });
        }

        let spec = self
            .graph
            .nodes
            .get(&node)
            .ok_or_else(|| GraphError::node_execution(&node, "node is not registered"))?;

        tracing::debug!(step = self.steps, node = %node, "Executing node");
        let fut = (spec.executor)(self.state.clone());
        let outcome = match self.node_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                tracing::error!(node = %node, timeout_ms = limit.as_millis() as u64, "Node timed out");
                GraphError::NodeTimeout {
                    node: node.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => fut.await,
        };
        self.state = outcome.map_err(|e| {
            tracing::error!(node = %node, error = %e, "Node execution failed");
            GraphError::node_execution(&node, e.to_string())
        })?;

        let checkpoint_id = match (&self.checkpoint_saver, &self.thread_id) {
            (Some(saver), Some(thread_id)) => {
                let checkpoint = saver.save(thread_id, &self.state).await?;
                tracing::debug!(
                    node = %node,
                    checkpoint_id = %checkpoint.checkpoint_id,
                    "Checkpoint saved"
                );
                Some(checkpoint.checkpoint_id)
            }
            _ => None,
        };

        let target = match self.graph.edge_from(&node) {
            Some(Edge::Direct(to)) => to.clone(),
            Some(Edge::Conditional { router, branches }) => {
                let label = router(&self.state);
                match branches.get(&label) {
                    Some(to) => {
                        tracing::debug!(node = %node, label = %label, target = %to, "Routed");
                        to.clone()
                    }
                    None => {
                        tracing::error!(node = %node, label = %label, "Unknown route label");
                        return Err(GraphError::unknown_route(node, label));
                    }
                }
            }
            None => END.to_string(),
        };

        let event = StepEvent {
            step: self.steps,
            node,
            state: self.state.clone(),
            checkpoint_id,
        };

        self.steps += 1;
        if target != END {
            self.next = Some(target);
        }
        Ok(Some(event))
    }
}
