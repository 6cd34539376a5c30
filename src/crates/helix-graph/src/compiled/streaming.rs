//! Streaming execution methods

use super::machine::StepMachine;
use super::{CompiledGraph, RunConfig};
use crate::error::Result;
use crate::stream::{StepEvent, StepStream};
use futures::stream::Stream;
use helix_checkpoint::CheckpointState;

impl<S: CheckpointState> CompiledGraph<S> {
    /// Stream one [`StepEvent`] per executed node
    pub fn stream(&self, input: S) -> StepStream<S> {
        self.stream_with_config(input, RunConfig::default())
    }

    /// Stream one event per executed node under a run config.
    ///
    /// Nothing runs until the stream is polled, and each node runs only when
    /// the previous event has been taken, so the caller can inspect state
    /// between steps. Dropping the stream stops the run before the next node.
    /// An error is yielded once, as the last item.
    pub fn stream_with_config(&self, input: S, config: RunConfig) -> StepStream<S> {
        let machine = StepMachine::new(self, input, config.thread_id);
        Box::pin(drive(machine))
    }
}

fn drive<S: CheckpointState>(
    mut machine: StepMachine<S>,
) -> impl Stream<Item = Result<StepEvent<S>>> + Send {
    async_stream::try_stream! {
        tracing::info!("Starting streamed graph execution");
        loop {
            let next = machine.advance().await.map_err(|e| {
                tracing::error!(error = %e, steps = machine.steps(), "Streamed graph execution failed");
                e
            })?;
            match next {
                Some(event) => yield event,
                None => break,
            }
        }
        tracing::info!(steps = machine.steps(), "Streamed graph execution completed");
    }
}
