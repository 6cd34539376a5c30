//! Directory-backed checkpoint storage
//!
//! One JSON-lines file per thread (`<root>/<thread_id>.jsonl`), one
//! checkpoint per line. Every operation runs under a single async mutex so a
//! reader never sees a half-written line, and every checkpoint read back is
//! verified against its fingerprint.

use crate::{
    checkpoint::{order_by_chain, Checkpoint, CheckpointState},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const EXTENSION: &str = "jsonl";

/// Checkpoint saver persisting each thread to its own JSON-lines file
pub struct FileCheckpointSaver<S> {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
    serializer: JsonSerializer,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for FileCheckpointSaver<S> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            lock: Arc::clone(&self.lock),
            serializer: self.serializer,
            _state: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for FileCheckpointSaver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCheckpointSaver")
            .field("root", &self.root)
            .finish()
    }
}

impl<S: CheckpointState> FileCheckpointSaver<S> {
    /// Open (creating if needed) a checkpoint directory
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "Opened file checkpoint store");
        Ok(Self {
            root,
            lock: Arc::new(Mutex::new(())),
            serializer: JsonSerializer::new(),
            _state: PhantomData,
        })
    }

    /// Directory holding the thread files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf> {
        validate_thread_id(thread_id)?;
        Ok(self.root.join(format!("{thread_id}.{EXTENSION}")))
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<Checkpoint<S>>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let checkpoint: Checkpoint<S> = self.serializer.loads(line.as_bytes())?;
            checkpoint.verify()?;
            checkpoints.push(checkpoint);
        }
        Ok(order_by_chain(checkpoints))
    }

    async fn thread_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn find(&self, checkpoint_id: &str) -> Result<Option<(PathBuf, Vec<Checkpoint<S>>)>> {
        for path in self.thread_files().await? {
            let checkpoints = self.read_file(&path).await?;
            if checkpoints.iter().any(|c| c.checkpoint_id == checkpoint_id) {
                return Ok(Some((path, checkpoints)));
            }
        }
        Ok(None)
    }

    async fn rewrite(&self, path: &Path, checkpoints: &[Checkpoint<S>]) -> Result<()> {
        if checkpoints.is_empty() {
            fs::remove_file(path).await?;
            return Ok(());
        }

        let mut buf = Vec::new();
        for checkpoint in checkpoints {
            buf.extend(self.serializer.dumps(checkpoint)?);
            buf.push(b'\n');
        }

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, &buf).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Thread ids become file names, so only a conservative alphabet is accepted.
fn validate_thread_id(thread_id: &str) -> Result<()> {
    let valid = !thread_id.is_empty()
        && !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(CheckpointError::Invalid(format!(
            "thread_id '{}' is not a safe file name",
            thread_id
        )))
    }
}

#[async_trait]
impl<S: CheckpointState> CheckpointSaver<S> for FileCheckpointSaver<S> {
    async fn save(&self, thread_id: &str, state: &S) -> Result<Checkpoint<S>> {
        let path = self.thread_path(thread_id)?;
        let _guard = self.lock.lock().await;

        let existing = self.read_file(&path).await?;
        let (parent, sequence) = match existing.last() {
            Some(last) => (Some(last.checkpoint_id.clone()), last.sequence + 1),
            None => (None, 0),
        };
        let checkpoint = Checkpoint::new(thread_id, parent, sequence, state.clone())?;

        let mut line = self.serializer.dumps(&checkpoint)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;

        tracing::trace!(
            thread_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            sequence,
            "Checkpoint appended"
        );
        Ok(checkpoint)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>> {
        let path = self.thread_path(thread_id)?;
        let _guard = self.lock.lock().await;
        Ok(self.read_file(&path).await?.pop())
    }

    async fn load_by_checkpoint_id(&self, checkpoint_id: &str) -> Result<Option<Checkpoint<S>>> {
        let _guard = self.lock.lock().await;
        Ok(self.find(checkpoint_id).await?.and_then(|(_, checkpoints)| {
            checkpoints
                .into_iter()
                .find(|c| c.checkpoint_id == checkpoint_id)
        }))
    }

    async fn list(&self, thread_id: &str) -> Result<CheckpointStream<S>> {
        let path = self.thread_path(thread_id)?;
        let checkpoints = {
            let _guard = self.lock.lock().await;
            self.read_file(&path).await?
        };
        Ok(Box::pin(stream::iter(checkpoints.into_iter().map(Ok))))
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let Some((path, mut checkpoints)) = self.find(checkpoint_id).await? else {
            return Ok(false);
        };

        checkpoints.retain(|c| c.checkpoint_id != checkpoint_id);
        self.rewrite(&path, &checkpoints).await?;
        Ok(true)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<usize> {
        let path = self.thread_path(thread_id)?;
        let _guard = self.lock.lock().await;

        let count = self.read_file(&path).await?.len();
        if count > 0 {
            fs::remove_file(&path).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Step {
        node: String,
        remaining: u64,
    }

    fn step(node: &str, remaining: u64) -> Step {
        Step {
            node: node.to_string(),
            remaining,
        }
    }

    #[tokio::test]
    async fn test_save_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        let first = saver.save("run-1", &step("supervisor", 500)).await.unwrap();
        let second = saver.save("run-1", &step("action", 400)).await.unwrap();

        let reopened = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        let history = reopened.history("run-1").await.unwrap();
        assert_eq!(history, vec![first.clone(), second.clone()]);
        assert_eq!(second.parent_checkpoint_id, Some(first.checkpoint_id));
        assert!(dir.path().join("run-1.jsonl").exists());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_thread_ids() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();

        for bad in ["", "../escape", "a/b", ".hidden"] {
            let err = saver.save(bad, &step("x", 1)).await.unwrap_err();
            assert!(matches!(err, CheckpointError::Invalid(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_load_by_checkpoint_id_searches_all_threads() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        saver.save("run-1", &step("supervisor", 500)).await.unwrap();
        let target = saver.save("run-2", &step("memory", 300)).await.unwrap();

        let found = saver
            .load_by_checkpoint_id(&target.checkpoint_id)
            .await
            .unwrap();
        assert_eq!(found, Some(target));
        assert!(saver.load_by_checkpoint_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tampered_line_fails_integrity_check() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        saver.save("run-1", &step("supervisor", 500)).await.unwrap();

        let path = dir.path().join("run-1.jsonl");
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.replace("\"remaining\":500", "\"remaining\":999")).unwrap();

        let err = saver.load("run-1").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_delete_rewrites_and_removes_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        let a = saver.save("run-1", &step("supervisor", 500)).await.unwrap();
        let b = saver.save("run-1", &step("narrative", 500)).await.unwrap();

        assert!(saver.delete(&a.checkpoint_id).await.unwrap());
        let remaining = saver.history("run-1").await.unwrap();
        assert_eq!(remaining, vec![b.clone()]);

        assert!(saver.delete(&b.checkpoint_id).await.unwrap());
        assert!(!dir.path().join("run-1.jsonl").exists());
        assert!(!saver.delete(&b.checkpoint_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_thread_counts_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCheckpointSaver::<Step>::open(dir.path()).await.unwrap();
        for i in 0..3 {
            saver.save("run-1", &step("supervisor", i)).await.unwrap();
        }

        assert_eq!(saver.delete_thread("run-1").await.unwrap(), 3);
        assert_eq!(saver.delete_thread("run-1").await.unwrap(), 0);
    }
}
