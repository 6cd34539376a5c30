//! Remote command executor
//!
//! Side effects that leave the process (sending a message, booking
//! something, calling a device) are not performed by agents directly. The
//! action agent queues a [`CommandRequest`] on a [`RemoteCommandExecutor`]
//! and records the ticket; whatever drains the queue is outside this crate.

use crate::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

/// Command to be executed outside the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Value,
    pub requested_by: String,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Value::Null,
            requested_by: requested_by.into(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// Receipt for a queued command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTicket {
    pub command_id: String,
    /// Zero-based position in the queue when it was accepted
    pub position: usize,
    pub queued_at: DateTime<Utc>,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub cancelled: usize,
    pub total_queued: usize,
}

#[async_trait]
pub trait RemoteCommandExecutor: Send + Sync {
    async fn queue_command(&self, request: CommandRequest) -> Result<CommandTicket>;

    async fn queue_status(&self) -> Result<QueueStatus>;

    /// Cancel a pending command. Returns false when it is not pending.
    async fn cancel_command(&self, command_id: &str) -> Result<bool>;
}

/// A command sitting in [`InMemoryCommandQueue`]
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    pub ticket: CommandTicket,
    pub request: CommandRequest,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueuedCommand>,
    cancelled: usize,
    total_queued: usize,
}

/// FIFO queue held in memory, with an optional capacity
#[derive(Debug, Default)]
pub struct InMemoryCommandQueue {
    inner: Mutex<QueueInner>,
    capacity: Option<usize>,
}

impl InMemoryCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that refuses new commands once `capacity` are pending
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity: Some(capacity),
        }
    }

    /// Pending commands, oldest first
    pub fn pending(&self) -> Vec<QueuedCommand> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Remove and return every pending command
    pub fn drain(&self) -> Vec<QueuedCommand> {
        self.inner.lock().pending.drain(..).collect()
    }
}

#[async_trait]
impl RemoteCommandExecutor for InMemoryCommandQueue {
    async fn queue_command(&self, request: CommandRequest) -> Result<CommandTicket> {
        let mut inner = self.inner.lock();
        if let Some(capacity) = self.capacity {
            if inner.pending.len() >= capacity {
                return Err(OrchestratorError::collaborator(format!(
                    "command queue full ({} pending)",
                    capacity
                )));
            }
        }

        let ticket = CommandTicket {
            command_id: Uuid::new_v4().to_string(),
            position: inner.pending.len(),
            queued_at: Utc::now(),
        };
        tracing::debug!(
            command_id = %ticket.command_id,
            command = %request.command,
            position = ticket.position,
            "Command queued"
        );
        inner.pending.push_back(QueuedCommand {
            ticket: ticket.clone(),
            request,
        });
        inner.total_queued += 1;
        Ok(ticket)
    }

    async fn queue_status(&self) -> Result<QueueStatus> {
        let inner = self.inner.lock();
        Ok(QueueStatus {
            pending: inner.pending.len(),
            cancelled: inner.cancelled,
            total_queued: inner.total_queued,
        })
    }

    async fn cancel_command(&self, command_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(idx) = inner
            .pending
            .iter()
            .position(|c| c.ticket.command_id == command_id)
        else {
            return Ok(false);
        };
        inner.pending.remove(idx);
        inner.cancelled += 1;
        Ok(true)
    }
}
