//! # helix-checkpoint - Run State Persistence
//!
//! Append-only persistence of `(thread, state)` snapshots for the helix
//! orchestration core. Every node transition of a run can be captured as an
//! immutable, fingerprinted [`Checkpoint`]; checkpoints of one run share a
//! `thread_id` and chain through their parent ids, which is what makes
//! resumption, history reconstruction and path comparison possible.
//!
//! ## Core Concepts
//!
//! - [`CheckpointSaver`] - the storage contract the engine and driver use
//! - [`Checkpoint`] - one snapshot, with a SHA-256 fingerprint of its state
//! - [`order_by_chain`] - restores creation order from parent links when
//!   clocks cannot be trusted
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`InMemoryCheckpointSaver`] | tests, single-process runs |
//! | [`FileCheckpointSaver`] | local persistence, one JSON-lines file per thread |
//!
//! Any other store (SQL, key-value, object storage) plugs in by implementing
//! [`CheckpointSaver`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use helix_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct RunState {
//!     task: String,
//!     budget_remaining_cents: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!     let state = RunState { task: "plan trip".into(), budget_remaining_cents: 500 };
//!
//!     let checkpoint = saver.save("thread-123", &state).await?;
//!     let restored = saver.load_by_checkpoint_id(&checkpoint.checkpoint_id).await?;
//!     assert!(restored.is_some());
//!
//!     for cp in saver.history("thread-123").await? {
//!         println!("{} -> {}", cp.sequence, cp.hash);
//!     }
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{fingerprint, order_by_chain, Checkpoint, CheckpointId, CheckpointState};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::{CheckpointSaver, CheckpointStream};
