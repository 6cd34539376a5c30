//! Step events produced by streaming execution

use crate::error::Result;
use futures::stream::Stream;
use helix_checkpoint::CheckpointId;
use serde::Serialize;
use std::pin::Pin;

/// One node transition of a run
///
/// Emitted after the node finished and, when checkpointing is active, after
/// its checkpoint was saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent<S> {
    /// Zero-based index of the node execution within the run
    pub step: usize,

    /// Node that just ran
    pub node: String,

    /// State returned by the node
    pub state: S,

    /// Checkpoint saved for this step, if any
    pub checkpoint_id: Option<CheckpointId>,
}

/// Lazy stream of step events; dropping it abandons the run
pub type StepStream<S> = Pin<Box<dyn Stream<Item = Result<StepEvent<S>>> + Send>>;
