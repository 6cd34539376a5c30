//! Runnable graphs
//!
//! A [`CompiledGraph`] is an immutable, validated graph plus execution
//! settings. It can be run any number of times, concurrently, with
//! [`invoke`](CompiledGraph::invoke) or [`stream`](CompiledGraph::stream).
//! Both drive the same step machine, so for the same graph and input they
//! reach the same final state.

mod execution;
mod graph;
mod machine;
mod streaming;

pub use graph::{CompiledGraph, RunConfig, DEFAULT_MAX_STEPS};
