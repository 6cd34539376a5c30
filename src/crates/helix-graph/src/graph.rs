//! Core graph data structures and types
//!
//! A [`Graph`] is a set of named nodes, each with exactly one outgoing
//! [`Edge`], and one entry node. Nodes are async functions from state to
//! state; edges either always go to the same target or ask a router which
//! labelled branch to take.
//!
//! ```text
//!              ┌────────────┐
//!   entry ───▶ │ supervisor │
//!              └─────┬──────┘
//!                    │ Conditional: router(&state) -> label
//!        ┌───────────┼───────────────┐
//!        ▼           ▼               ▼
//!   "narrative"   "action"         "end"
//!        │           │               │
//!        └── Direct ─┴──── Direct ───┴──▶ END
//! ```
//!
//! [`StateGraph`](crate::StateGraph) is the builder; this module only holds
//! the data and its structural validation.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Node identifier - unique name for each node in the graph
pub type NodeId = String;

/// Special node identifier for graph termination
///
/// Edges pointing here finish the run. No node may use this name.
pub const END: &str = "__end__";

/// Error type node functions may fail with
pub type NodeError = Box<dyn Error + Send + Sync>;

/// Future returned by a node executor
pub type NodeFuture<S> = Pin<Box<dyn Future<Output = Result<S, NodeError>> + Send>>;

/// Async node function: takes the current state, returns the next one
pub type NodeExecutor<S> = Arc<dyn Fn(S) -> NodeFuture<S> + Send + Sync>;

/// Router for a conditional edge: inspects the state and returns a branch label
pub type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Edge type defining the transition out of a node
pub enum Edge<S> {
    /// Unconditional edge to a specific node (or [`END`])
    Direct(NodeId),

    /// Conditional edge with dynamic routing
    Conditional {
        /// Returns the label of the branch to take
        router: RouterFn<S>,

        /// Label to target node (or [`END`]). A label outside this map is a
        /// routing error at run time.
        branches: HashMap<String, NodeId>,
    },
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Direct(to) => Edge::Direct(to.clone()),
            Edge::Conditional { router, branches } => Edge::Conditional {
                router: Arc::clone(router),
                branches: branches.clone(),
            },
        }
    }
}

impl<S> Debug for Edge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

impl<S> Edge<S> {
    /// Every node this edge may lead to
    pub fn targets(&self) -> Vec<&NodeId> {
        match self {
            Edge::Direct(to) => vec![to],
            Edge::Conditional { branches, .. } => branches.values().collect(),
        }
    }
}

/// Node specification
pub struct NodeSpec<S> {
    /// Node name, as used in edges and step events
    pub name: NodeId,

    /// The node function
    pub executor: NodeExecutor<S>,
}

impl<S> Clone for NodeSpec<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<S> Debug for NodeSpec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .finish()
    }
}

/// Graph structure: nodes, their outgoing edges and the entry point
pub struct Graph<S> {
    /// All nodes in the graph mapped by their unique IDs
    pub nodes: HashMap<NodeId, NodeSpec<S>>,

    /// Outgoing edges by source node. Valid graphs have exactly one per node.
    pub edges: HashMap<NodeId, Vec<Edge<S>>>,

    /// Entry node, if one was set
    pub entry: Option<NodeId>,

    /// Names registered more than once, reported by [`validate`](Self::validate)
    pub(crate) duplicates: Vec<NodeId>,
}

impl<S> Clone for Graph<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            entry: self.entry.clone(),
            duplicates: self.duplicates.clone(),
        }
    }
}

impl<S> Debug for Graph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

impl<S> Default for Graph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Graph<S> {
    /// Create a new empty graph with no entry point
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            duplicates: Vec::new(),
        }
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, id: NodeId, spec: NodeSpec<S>) {
        if self.nodes.insert(id.clone(), spec).is_some() {
            self.duplicates.push(id);
        }
    }

    /// Add a direct (unconditional) edge between two nodes
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    /// Add a conditional edge with dynamic routing
    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: RouterFn<S>,
        branches: HashMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    /// Set the entry point
    pub fn set_entry(&mut self, node: NodeId) {
        self.entry = Some(node);
    }

    /// Node names in sorted order
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The single outgoing edge of a node, if the graph is valid
    pub fn edge_from(&self, node: &str) -> Option<&Edge<S>> {
        self.edges.get(node).and_then(|edges| edges.first())
    }

    /// Validate the graph structure
    ///
    /// Rejects: a missing or unknown entry, a node named [`END`], a node
    /// registered twice, an edge whose source or target is unknown, and a
    /// node with zero or several outgoing edges.
    pub fn validate(&self) -> Result<(), String> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| "No entry point set".to_string())?;

        if self.nodes.contains_key(END) {
            return Err(format!("Node name '{}' is reserved", END));
        }
        if let Some(dup) = self.duplicates.first() {
            return Err(format!("Node '{}' registered more than once", dup));
        }
        if !self.nodes.contains_key(entry) {
            return Err(format!("Entry point '{}' does not exist", entry));
        }

        let mut sources: Vec<&NodeId> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.nodes.contains_key(from) {
                return Err(format!("Edge source '{}' does not exist", from));
            }
            for edge in &self.edges[from] {
                for to in edge.targets() {
                    if to != END && !self.nodes.contains_key(to) {
                        return Err(format!(
                            "Edge target '{}' (from '{}') does not exist",
                            to, from
                        ));
                    }
                }
            }
        }

        for name in self.node_names() {
            match self.edges.get(name).map_or(0, Vec::len) {
                1 => {}
                0 => return Err(format!("Node '{}' has no outgoing edge", name)),
                n => {
                    return Err(format!(
                        "Node '{}' has {} outgoing edges, expected exactly one",
                        name, n
                    ))
                }
            }
        }

        Ok(())
    }
}
