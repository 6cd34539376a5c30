//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's checkpoints in insertion
//! order behind a single `tokio::sync::RwLock`. A save builds and appends the
//! checkpoint while holding the write lock, so concurrent readers see either
//! the whole checkpoint or nothing.
//!
//! ```text
//! Arc<RwLock<Storage>>
//!   threads: "run-1" -> [cp-a, cp-b, cp-c]
//!            "run-2" -> [cp-x]
//!   index:   cp-a -> "run-1", cp-b -> "run-1", ...
//! ```
//!
//! Cloning the saver shares the same storage.

use crate::{
    checkpoint::{Checkpoint, CheckpointId, CheckpointState},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Storage<S> {
    threads: HashMap<String, Vec<Checkpoint<S>>>,
    index: HashMap<CheckpointId, String>,
}

impl<S> Default for Storage<S> {
    fn default() -> Self {
        Self {
            threads: HashMap::new(),
            index: HashMap::new(),
        }
    }
}

/// In-memory checkpoint saver implementation
///
/// # Example
///
/// ```rust
/// use helix_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let saver = InMemoryCheckpointSaver::<u32>::new();
///     let first = saver.save("thread-1", &1).await?;
///     let second = saver.save("thread-1", &2).await?;
///
///     assert_eq!(second.parent_checkpoint_id, Some(first.checkpoint_id));
///     assert_eq!(saver.load("thread-1").await?.map(|c| c.state), Some(2));
///     Ok(())
/// }
/// ```
pub struct InMemoryCheckpointSaver<S> {
    storage: Arc<RwLock<Storage<S>>>,
}

impl<S> Clone for InMemoryCheckpointSaver<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S> std::fmt::Debug for InMemoryCheckpointSaver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCheckpointSaver").finish_non_exhaustive()
    }
}

impl<S: CheckpointState> InMemoryCheckpointSaver<S> {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage::default())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.threads.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.index.len()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.threads.clear();
        storage.index.clear();
    }
}

impl<S: CheckpointState> Default for InMemoryCheckpointSaver<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: CheckpointState> CheckpointSaver<S> for InMemoryCheckpointSaver<S> {
    async fn save(&self, thread_id: &str, state: &S) -> Result<Checkpoint<S>> {
        if thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut storage = self.storage.write().await;
        let entries = storage.threads.entry(thread_id.to_string()).or_default();

        let (parent, sequence) = match entries.last() {
            Some(last) => (Some(last.checkpoint_id.clone()), last.sequence + 1),
            None => (None, 0),
        };
        let checkpoint = Checkpoint::new(thread_id, parent, sequence, state.clone())?;
        entries.push(checkpoint.clone());

        storage
            .index
            .insert(checkpoint.checkpoint_id.clone(), thread_id.to_string());

        tracing::trace!(
            thread_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            sequence = checkpoint.sequence,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>> {
        let storage = self.storage.read().await;
        Ok(storage
            .threads
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn load_by_checkpoint_id(&self, checkpoint_id: &str) -> Result<Option<Checkpoint<S>>> {
        let storage = self.storage.read().await;
        let Some(thread_id) = storage.index.get(checkpoint_id) else {
            return Ok(None);
        };

        Ok(storage.threads.get(thread_id).and_then(|entries| {
            entries
                .iter()
                .find(|c| c.checkpoint_id == checkpoint_id)
                .cloned()
        }))
    }

    async fn list(&self, thread_id: &str) -> Result<CheckpointStream<S>> {
        let entries = {
            let storage = self.storage.read().await;
            storage.threads.get(thread_id).cloned().unwrap_or_default()
        };

        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool> {
        let mut storage = self.storage.write().await;
        let Some(thread_id) = storage.index.remove(checkpoint_id) else {
            return Ok(false);
        };

        let now_empty = match storage.threads.get_mut(&thread_id) {
            Some(entries) => {
                entries.retain(|c| c.checkpoint_id != checkpoint_id);
                entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            storage.threads.remove(&thread_id);
        }
        Ok(true)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<usize> {
        let mut storage = self.storage.write().await;
        let removed = storage.threads.remove(thread_id).unwrap_or_default();
        for checkpoint in &removed {
            storage.index.remove(&checkpoint.checkpoint_id);
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let saver = InMemoryCheckpointSaver::<String>::new();

        let saved = saver.save("thread-1", &"hello".to_string()).await.unwrap();
        assert!(saved.is_root());
        assert_eq!(saved.sequence, 0);

        let loaded = saver.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded, saved);

        let by_id = saver
            .load_by_checkpoint_id(&saved.checkpoint_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, saved);
    }

    #[tokio::test]
    async fn test_save_chains_parents() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        let a = saver.save("thread-1", &1).await.unwrap();
        let b = saver.save("thread-1", &2).await.unwrap();
        let c = saver.save("thread-1", &3).await.unwrap();

        assert_eq!(b.parent_checkpoint_id.as_ref(), Some(&a.checkpoint_id));
        assert_eq!(c.parent_checkpoint_id.as_ref(), Some(&b.checkpoint_id));
        assert_eq!(c.sequence, 2);

        // The first returned checkpoint was not touched by later saves
        assert!(a.parent_checkpoint_id.is_none());
        assert_eq!(a.state, 1);
    }

    #[tokio::test]
    async fn test_list_checkpoints() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        for i in 0..3 {
            saver.save("thread-1", &i).await.unwrap();
        }
        saver.save("thread-2", &100).await.unwrap();

        let stream = saver.list("thread-1").await.unwrap();
        let states: Vec<u32> = stream.map(|r| r.unwrap().state).collect().await;
        assert_eq!(states, vec![0, 1, 2]);

        let empty = saver.history("unknown").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_missing_lookups_return_none() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        assert!(saver.load("nope").await.unwrap().is_none());
        assert!(saver.load_by_checkpoint_id("nope").await.unwrap().is_none());
        assert!(!saver.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_thread_id_rejected() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        let err = saver.save("", &1).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_delete_checkpoint() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        let a = saver.save("thread-1", &1).await.unwrap();
        saver.save("thread-1", &2).await.unwrap();

        assert!(saver.delete(&a.checkpoint_id).await.unwrap());
        assert!(saver
            .load_by_checkpoint_id(&a.checkpoint_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(saver.checkpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        saver.save("thread-1", &1).await.unwrap();
        saver.save("thread-1", &2).await.unwrap();
        saver.save("thread-2", &3).await.unwrap();

        assert_eq!(saver.thread_count().await, 2);
        assert_eq!(saver.delete_thread("thread-1").await.unwrap(), 2);
        assert_eq!(saver.thread_count().await, 1);
        assert_eq!(saver.checkpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let saver = InMemoryCheckpointSaver::<u32>::new();
        saver.save("thread-1", &1).await.unwrap();
        assert_eq!(saver.checkpoint_count().await, 1);

        saver.clear().await;
        assert_eq!(saver.checkpoint_count().await, 0);
        assert_eq!(saver.thread_count().await, 0);
    }
}
