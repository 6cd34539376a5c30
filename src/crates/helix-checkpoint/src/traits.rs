//! Checkpoint storage trait for pluggable backends
//!
//! [`CheckpointSaver`] is the only thing the graph engine and the orchestrator
//! know about persistence. A run behaves identically whether the saver is
//! backed by memory, a directory of files, or a remote database.
//!
//! # Contract
//!
//! | Operation | Guarantee |
//! |-----------|-----------|
//! | `save` | appends a new checkpoint whose parent is the thread's latest; never touches earlier checkpoints |
//! | `load` | most recent checkpoint of a thread, or `None` |
//! | `load_by_checkpoint_id` | idempotent and side-effect-free |
//! | `list` | creation order, oldest first; ties broken by parent chain, never by clock |
//! | `delete` | removes one checkpoint; `false` if it did not exist |
//!
//! Implementations must be `Send + Sync`: several runs on different threads
//! may save and list concurrently, and a reader must never observe a
//! partially written checkpoint.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use helix_checkpoint::{Checkpoint, CheckpointSaver, CheckpointState, CheckpointStream, Result};
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointSaver {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl<S: CheckpointState> CheckpointSaver<S> for PostgresCheckpointSaver {
//!     async fn save(&self, thread_id: &str, state: &S) -> Result<Checkpoint<S>> {
//!         // SELECT the latest row for the thread, build Checkpoint::new(..),
//!         // INSERT it inside the same transaction.
//!         todo!()
//!     }
//!     // load, load_by_checkpoint_id, list, delete ...
//! }
//! ```

use crate::checkpoint::{Checkpoint, CheckpointState};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use futures::TryStreamExt;
use std::pin::Pin;

/// Type alias for async stream of checkpoints
pub type CheckpointStream<S> = Pin<Box<dyn Stream<Item = Result<Checkpoint<S>>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver<S: CheckpointState>: Send + Sync {
    /// Append a snapshot of `state` to `thread_id`
    ///
    /// # Returns
    ///
    /// The stored checkpoint. Later saves never modify it.
    async fn save(&self, thread_id: &str, state: &S) -> Result<Checkpoint<S>>;

    /// Fetch the most recent checkpoint of a thread
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>>;

    /// Fetch a checkpoint by its id, whatever thread it belongs to
    async fn load_by_checkpoint_id(&self, checkpoint_id: &str) -> Result<Option<Checkpoint<S>>>;

    /// Stream every checkpoint of a thread, oldest first
    ///
    /// An unknown thread yields an empty stream, not an error.
    async fn list(&self, thread_id: &str) -> Result<CheckpointStream<S>>;

    /// Delete a single checkpoint
    ///
    /// # Returns
    ///
    /// `true` if a checkpoint was removed
    async fn delete(&self, checkpoint_id: &str) -> Result<bool>;

    /// Collect [`list`](Self::list) into a vector
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>> {
        let stream = self.list(thread_id).await?;
        stream.try_collect().await
    }

    /// Delete every checkpoint of a thread, returning how many were removed
    async fn delete_thread(&self, thread_id: &str) -> Result<usize> {
        let mut removed = 0;
        for checkpoint in self.history(thread_id).await? {
            if self.delete(&checkpoint.checkpoint_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
