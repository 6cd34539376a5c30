//! Graph execution methods (invoke)

use super::machine::StepMachine;
use super::{CompiledGraph, RunConfig};
use crate::error::Result;
use helix_checkpoint::CheckpointState;

impl<S: CheckpointState> CompiledGraph<S> {
    /// Execute the graph to completion without checkpointing.
    ///
    /// # Returns
    ///
    /// The state returned by the last node before END.
    pub async fn invoke(&self, input: S) -> Result<S> {
        self.invoke_with_config(input, RunConfig::default()).await
    }

    /// Execute the graph to completion under a run config.
    ///
    /// With a checkpointer attached and `config.thread_id` set, a checkpoint
    /// is saved after every node; a failed save fails the run.
    ///
    /// # Errors
    ///
    /// Any [`GraphError`](crate::GraphError) other than `Validation`.
    #[tracing::instrument(skip(self, input, config), fields(thread_id = ?config.thread_id, max_steps = self.max_steps))]
    pub async fn invoke_with_config(&self, input: S, config: RunConfig) -> Result<S> {
        tracing::info!("Starting graph execution");

        let mut machine = StepMachine::new(self, input, config.thread_id);
        loop {
            match machine.advance().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, steps = machine.steps(), "Graph execution failed");
                    return Err(e);
                }
            }
        }

        tracing::info!(steps = machine.steps(), "Graph execution completed successfully");
        Ok(machine.into_state())
    }
}
