//! StateGraph builder API
//!
//! [`StateGraph`] collects nodes and edges and checks the whole structure
//! once, in [`compile`](StateGraph::compile). Nothing is validated while
//! building, so nodes and edges may be added in any order.
//!
//! ```rust
//! use helix_graph::{StateGraph, END};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::<Vec<String>>::new();
//! graph
//!     .add_node("greet", |mut log: Vec<String>| async move {
//!         log.push("hello".to_string());
//!         Ok::<_, String>(log)
//!     })
//!     .add_conditional_edge(
//!         "greet",
//!         |log: &Vec<String>| if log.len() > 1 { "done" } else { "again" }.to_string(),
//!         [("again", "greet"), ("done", END)],
//!     )
//!     .set_entry("greet");
//!
//! let compiled = graph.compile()?;
//! assert_eq!(compiled.invoke(Vec::new()).await?.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeError, NodeExecutor, NodeFuture, NodeId, NodeSpec};
use helix_checkpoint::CheckpointState;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Builder for typed state graphs
pub struct StateGraph<S> {
    graph: Graph<S>,
}

impl<S> Default for StateGraph<S> {
    fn default() -> Self {
        Self { graph: Graph::new() }
    }
}

impl<S> std::fmt::Debug for StateGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGraph").field("graph", &self.graph).finish()
    }
}

impl<S: CheckpointState> StateGraph<S> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node from an async function
    ///
    /// The function receives the current state by value and returns the next
    /// state. Any error convertible into a boxed error fails the run with
    /// [`GraphError::NodeExecution`].
    pub fn add_node<F, Fut, E>(&mut self, id: impl Into<NodeId>, executor: F) -> &mut Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<S, E>> + Send + 'static,
        E: Into<NodeError>,
    {
        let executor: NodeExecutor<S> = Arc::new(move |state: S| -> NodeFuture<S> {
            let fut = executor(state);
            Box::pin(async move { fut.await.map_err(Into::into) })
        });
        self.add_node_with_executor(id, executor)
    }

    /// Add a node with a pre-built executor
    pub fn add_node_with_executor(
        &mut self,
        id: impl Into<NodeId>,
        executor: NodeExecutor<S>,
    ) -> &mut Self {
        let id = id.into();
        let spec = NodeSpec {
            name: id.clone(),
            executor,
        };
        self.graph.add_node(id, spec);
        self
    }

    /// Add a fixed edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Add a conditional edge that routes based on state
    ///
    /// # Arguments
    ///
    /// * `from` - Source node ID
    /// * `router` - Returns the label of the branch to take
    /// * `branches` - Label to target node; [`END`](crate::END) is a valid target
    pub fn add_conditional_edge<R, I, K, V>(
        &mut self,
        from: impl Into<NodeId>,
        router: R,
        branches: I,
    ) -> &mut Self
    where
        R: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<NodeId>,
    {
        let branches: HashMap<String, NodeId> = branches
            .into_iter()
            .map(|(label, to)| (label.into(), to.into()))
            .collect();
        self.graph
            .add_conditional_edge(from.into(), Arc::new(router), branches);
        self
    }

    /// Set the entry point of the graph
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.set_entry(node.into());
        self
    }

    /// Get a reference to the graph under construction
    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Validate the structure and produce a runnable graph
    ///
    /// # Errors
    ///
    /// [`GraphError::Validation`] describing the first structural problem
    /// found. See [`Graph::validate`].
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        self.graph.validate().map_err(|msg| {
            tracing::debug!(error = %msg, "Graph compilation rejected");
            GraphError::Validation(msg)
        })?;
        Ok(CompiledGraph::new(self.graph))
    }
}
