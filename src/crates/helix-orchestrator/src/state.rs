//! Run state threaded through the orchestration graph
//!
//! [`OrchestratorState`] is an owned value: every node receives it, returns
//! a new one, and only the graph engine moves it between nodes. The task
//! and the total budget are fixed at construction; the message log only
//! grows; the remaining budget only shrinks and never drops below zero or
//! rises above the total.
//!
//! Deserialization goes through the same checks, so a checkpoint whose
//! budget fields contradict each other is rejected instead of resumed.

use crate::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry in the run's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// Agent that produced the message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, name: Option<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            name,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, None, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, None, content)
    }

    /// Message attributed to a named agent
    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(name.into()), content)
    }

    /// Result of a tool or external command
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Tool, Some(name.into()), content)
    }
}

/// State of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateRecord")]
pub struct OrchestratorState {
    task: String,
    messages: Vec<Message>,
    start_time: DateTime<Utc>,
    budget_cents: u64,
    budget_remaining_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

/// Wire form of [`OrchestratorState`], checked on the way in
#[derive(Deserialize)]
struct StateRecord {
    task: String,
    #[serde(default)]
    messages: Vec<Message>,
    start_time: DateTime<Utc>,
    budget_cents: u64,
    budget_remaining_cents: u64,
    #[serde(default)]
    next: Option<String>,
}

impl TryFrom<StateRecord> for OrchestratorState {
    type Error = String;

    fn try_from(record: StateRecord) -> std::result::Result<Self, Self::Error> {
        if record.budget_remaining_cents > record.budget_cents {
            return Err(format!(
                "budget_remaining_cents ({}) exceeds budget_cents ({})",
                record.budget_remaining_cents, record.budget_cents
            ));
        }
        Ok(Self {
            task: record.task,
            messages: record.messages,
            start_time: record.start_time,
            budget_cents: record.budget_cents,
            budget_remaining_cents: record.budget_remaining_cents,
            next: record.next,
        })
    }
}

impl OrchestratorState {
    /// Fresh state with the full budget available
    pub fn new(task: impl Into<String>, budget_cents: u64) -> Self {
        Self {
            task: task.into(),
            messages: Vec::new(),
            start_time: Utc::now(),
            budget_cents,
            budget_remaining_cents: budget_cents,
            next: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn budget_cents(&self) -> u64 {
        self.budget_cents
    }

    pub fn budget_remaining_cents(&self) -> u64 {
        self.budget_remaining_cents
    }

    pub fn spent_cents(&self) -> u64 {
        self.budget_cents - self.budget_remaining_cents
    }

    /// Routing label chosen by the supervisor
    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn can_afford(&self, cents: u64) -> bool {
        cents <= self.budget_remaining_cents
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Builder-style [`push_message`](Self::push_message)
    pub fn with_message(mut self, message: Message) -> Self {
        self.push_message(message);
        self
    }

    pub fn route_to(&mut self, label: impl Into<String>) {
        self.next = Some(label.into());
    }

    pub fn clear_route(&mut self) {
        self.next = None;
    }

    /// Deduct `cents` from the remaining budget
    ///
    /// Fails without touching the state when `cents` exceeds the remainder.
    pub fn try_spend(&mut self, cents: u64) -> Result<()> {
        if cents > self.budget_remaining_cents {
            return Err(OrchestratorError::Budget {
                requested: cents,
                remaining: self.budget_remaining_cents,
            });
        }
        self.budget_remaining_cents -= cents;
        Ok(())
    }

    /// Deduct up to `cents`, stopping at zero. Returns the amount deducted.
    pub fn spend_saturating(&mut self, cents: u64) -> u64 {
        let spent = cents.min(self.budget_remaining_cents);
        self.budget_remaining_cents -= spent;
        spent
    }
}
