//! Core checkpoint data structure
//!
//! A [`Checkpoint`] is an immutable snapshot of a run's full state taken after
//! one node transition. Checkpoints belonging to the same logical run share a
//! `thread_id` and form a chain through `parent_checkpoint_id`:
//!
//! ```text
//! thread "run-42"
//!   [0] cp-a  parent: None
//!   [1] cp-b  parent: cp-a
//!   [2] cp-c  parent: cp-b   <- load("run-42") returns this one
//! ```
//!
//! Every checkpoint carries a SHA-256 fingerprint of its serialized state so
//! a store (or an auditor) can detect a snapshot that was altered after it
//! was written. See [`Checkpoint::verify`].

use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Bounds a state type must satisfy to be checkpointed.
///
/// Blanket-implemented for every type that meets them.
pub trait CheckpointState: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CheckpointState for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// State snapshot at a given point in a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    /// Unique identifier of this checkpoint
    pub checkpoint_id: CheckpointId,

    /// Thread this checkpoint belongs to
    pub thread_id: String,

    /// Previous checkpoint in the same thread, `None` for the first one
    pub parent_checkpoint_id: Option<CheckpointId>,

    /// Zero-based position within the thread at creation time
    pub sequence: u64,

    /// Full state snapshot (never a diff)
    pub state: S,

    /// When the checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Hex SHA-256 of the serialized state
    pub hash: String,
}

impl<S: CheckpointState> Checkpoint<S> {
    /// Create a new checkpoint with a fresh id and a computed fingerprint
    pub fn new(
        thread_id: impl Into<String>,
        parent_checkpoint_id: Option<CheckpointId>,
        sequence: u64,
        state: S,
    ) -> Result<Self> {
        let hash = fingerprint(&state)?;
        Ok(Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            parent_checkpoint_id,
            sequence,
            state,
            timestamp: Utc::now(),
            hash,
        })
    }

    /// Recompute the fingerprint and compare it to the stored one
    pub fn verify(&self) -> Result<()> {
        let actual = fingerprint(&self.state)?;
        if actual != self.hash {
            return Err(CheckpointError::Integrity {
                checkpoint_id: self.checkpoint_id.clone(),
                expected: self.hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Whether this is the first checkpoint of its thread
    pub fn is_root(&self) -> bool {
        self.parent_checkpoint_id.is_none()
    }
}

/// Compute the hex SHA-256 fingerprint of a state value
///
/// The state goes through `serde_json::Value` first so map keys are hashed
/// in sorted order. Hash maps inside the state iterate in per-instance
/// order and would otherwise fingerprint differently after a reload.
pub fn fingerprint<S: Serialize>(state: &S) -> Result<String> {
    let serializer = JsonSerializer::new();
    let canonical = serializer.dumps_json(state)?;
    let bytes = serializer.dumps(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Order checkpoints of one thread by following parent links from the root.
///
/// Clocks may collide, so timestamps only break ties between siblings and
/// between detached entries (whose parent is not in the input, e.g. after a
/// delete). Entries are never dropped.
pub fn order_by_chain<S>(checkpoints: Vec<Checkpoint<S>>) -> Vec<Checkpoint<S>> {
    let ids: HashSet<&str> = checkpoints
        .iter()
        .map(|c| c.checkpoint_id.as_str())
        .collect();

    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, checkpoint) in checkpoints.iter().enumerate() {
        match checkpoint.parent_checkpoint_id.as_deref() {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent).or_default().push(idx);
            }
            _ => roots.push(idx),
        }
    }

    let key = |idx: &usize| (checkpoints[*idx].sequence, checkpoints[*idx].timestamp);
    roots.sort_by_key(key);
    for siblings in children.values_mut() {
        siblings.sort_by_key(key);
    }

    let mut order = Vec::with_capacity(checkpoints.len());
    let mut visited = vec![false; checkpoints.len()];
    for root in roots {
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            order.push(idx);
            if let Some(next) = children.get(checkpoints[idx].checkpoint_id.as_str()) {
                stack.extend(next.iter().rev().copied());
            }
        }
    }

    // Cycles cannot come from a well-behaved store, but keep whatever is left.
    let mut rest: Vec<usize> = (0..checkpoints.len()).filter(|i| !visited[*i]).collect();
    rest.sort_by_key(key);
    order.extend(rest);

    let mut slots: Vec<Option<Checkpoint<S>>> = checkpoints.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: i64,
    }

    fn chain(thread: &str, len: u64) -> Vec<Checkpoint<Counter>> {
        let mut out: Vec<Checkpoint<Counter>> = Vec::new();
        for i in 0..len {
            let parent = out.last().map(|c| c.checkpoint_id.clone());
            out.push(Checkpoint::new(thread, parent, i, Counter { value: i as i64 }).unwrap());
        }
        out
    }

    #[test]
    fn test_new_checkpoint_has_fingerprint() {
        let cp = Checkpoint::new("t1", None, 0, Counter { value: 1 }).unwrap();
        assert_eq!(cp.hash.len(), 64);
        assert!(cp.is_root());
        assert!(cp.verify().is_ok());
    }

    #[test]
    fn test_same_state_same_fingerprint() {
        let a = fingerprint(&Counter { value: 7 }).unwrap();
        let b = fingerprint(&Counter { value: 7 }).unwrap();
        let c = fingerprint(&Counter { value: 8 }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_ignores_map_iteration_order() {
        let counts: HashMap<String, u32> = (0..32).map(|i| (format!("key-{i}"), i)).collect();
        let original = fingerprint(&counts).unwrap();

        let bytes = serde_json::to_vec(&counts).unwrap();
        let reloaded: HashMap<String, u32> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(fingerprint(&reloaded).unwrap(), original);

        let cp = Checkpoint::new("t1", None, 0, counts).unwrap();
        let line = serde_json::to_vec(&cp).unwrap();
        let restored: Checkpoint<HashMap<String, u32>> = serde_json::from_slice(&line).unwrap();
        assert!(restored.verify().is_ok());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut cp = Checkpoint::new("t1", None, 0, Counter { value: 1 }).unwrap();
        cp.state.value = 99;
        match cp.verify() {
            Err(CheckpointError::Integrity { checkpoint_id, .. }) => {
                assert_eq!(checkpoint_id, cp.checkpoint_id)
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_order_by_chain_ignores_colliding_clocks() {
        let mut checkpoints = chain("t1", 4);
        let ts = checkpoints[0].timestamp;
        for cp in checkpoints.iter_mut() {
            cp.timestamp = ts;
        }
        let expected: Vec<String> = checkpoints.iter().map(|c| c.checkpoint_id.clone()).collect();

        checkpoints.reverse();
        checkpoints.swap(0, 2);
        let ordered: Vec<String> = order_by_chain(checkpoints)
            .into_iter()
            .map(|c| c.checkpoint_id)
            .collect();

        assert_eq!(ordered, expected);
    }

    #[test]
    fn test_order_by_chain_keeps_detached_entries() {
        let mut checkpoints = chain("t1", 3);
        // Drop the middle entry: the last one now points at a missing parent.
        let tail = checkpoints.pop().unwrap();
        checkpoints.pop();
        checkpoints.insert(0, tail.clone());

        let ordered = order_by_chain(checkpoints);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[1].checkpoint_id, tail.checkpoint_id);
    }
}
