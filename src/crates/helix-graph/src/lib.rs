//! # helix-graph - Typed Execution Graphs
//!
//! A small, strictly validated graph engine: named async nodes threaded by
//! one owned state value, fixed or conditional edges, one entry node, and a
//! reserved terminal [`END`].
//!
//! ## Overview
//!
//! - [`StateGraph`] builds the graph; [`StateGraph::compile`] validates it
//! - [`CompiledGraph::invoke`] runs to END and returns the final state
//! - [`CompiledGraph::stream`] yields a [`StepEvent`] after every node
//! - [`CompiledGraph::with_checkpointer`] saves a checkpoint per node for
//!   runs that carry a thread id
//!
//! Routing is explicit: a conditional edge lists every label it accepts and
//! a router returning anything else fails the run with
//! [`GraphError::UnknownRoute`]. Runs are bounded by a step guard
//! ([`DEFAULT_MAX_STEPS`]) and optionally by a per-node timeout.
//!
//! ## Quick Start
//!
//! ```rust
//! use helix_graph::{StateGraph, END};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::<u64>::new();
//! graph
//!     .add_node("double", |n: u64| async move { Ok::<_, String>(n * 2) })
//!     .add_edge("double", END)
//!     .set_entry("double");
//!
//! let compiled = graph.compile()?;
//! assert_eq!(compiled.invoke(21).await?, 42);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod stream;

pub use builder::StateGraph;
pub use compiled::{CompiledGraph, RunConfig, DEFAULT_MAX_STEPS};
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, NodeError, NodeExecutor, NodeFuture, NodeId, NodeSpec, RouterFn, END};
pub use stream::{StepEvent, StepStream};
