//! Collaborators the spawner consults or reports to
//!
//! | Trait | Called | Reference implementation |
//! |-------|--------|--------------------------|
//! | [`ModelRouter`] | inline, before registering a model | [`StaticModelRouter`] |
//! | [`CostLedger`] | detached, once per spawn | [`InMemoryCostLedger`] |
//! | [`AuditLog`] | detached, once per spawn | [`InMemoryAuditLog`] |
//!
//! A router failure falls back to the spawner's default selection; ledger
//! and audit failures are logged and dropped. None of them can fail a spawn.

use super::operation::{ModelSelection, OperationType};
use crate::config::OrchestratorConfig;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Input to model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub user_id: String,
    pub estimated_input_tokens: u64,
}

/// Model chosen for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub selection: ModelSelection,
    pub estimated_cost_usd: f64,
}

#[async_trait]
pub trait ModelRouter: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<RouteDecision>;
}

/// Fixed operation-type to model table with a required fallback
#[derive(Debug, Clone)]
pub struct StaticModelRouter {
    table: HashMap<OperationType, ModelSelection>,
    default: ModelSelection,
    usd_per_1k_tokens: f64,
}

impl StaticModelRouter {
    pub fn new(default: ModelSelection) -> Self {
        Self {
            table: HashMap::new(),
            default,
            usd_per_1k_tokens: 0.003,
        }
    }

    /// Router that sends everything to the configured action-agent model
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let action = &config.action_agent;
        Self::new(ModelSelection::new(action.provider, action.model.clone()))
    }

    pub fn with_route(
        mut self,
        operation_type: OperationType,
        selection: ModelSelection,
    ) -> Self {
        self.table.insert(operation_type, selection);
        self
    }

    pub fn with_price(mut self, usd_per_1k_tokens: f64) -> Self {
        self.usd_per_1k_tokens = usd_per_1k_tokens;
        self
    }

    pub fn default_selection(&self) -> &ModelSelection {
        &self.default
    }
}

#[async_trait]
impl ModelRouter for StaticModelRouter {
    async fn route(&self, request: &RouteRequest) -> Result<RouteDecision> {
        let selection = self
            .table
            .get(&request.operation_type)
            .unwrap_or(&self.default)
            .clone();
        Ok(RouteDecision {
            selection,
            estimated_cost_usd: request.estimated_input_tokens as f64 / 1000.0
                * self.usd_per_1k_tokens,
        })
    }
}

/// One spend entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub model_used: String,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub success: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn log_operation(&self, user_id: &str, record: CostRecord) -> Result<()>;
}

/// Ledger that keeps `(user_id, record)` pairs in memory
#[derive(Debug, Default)]
pub struct InMemoryCostLedger {
    entries: Mutex<Vec<(String, CostRecord)>>,
}

impl InMemoryCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, CostRecord)> {
        self.entries.lock().clone()
    }

    pub fn total_usd_for(&self, user_id: &str) -> f64 {
        self.entries
            .lock()
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, r)| r.cost_usd)
            .sum()
    }
}

#[async_trait]
impl CostLedger for InMemoryCostLedger {
    async fn log_operation(&self, user_id: &str, record: CostRecord) -> Result<()> {
        self.entries.lock().push((user_id.to_string(), record));
        Ok(())
    }
}

/// Something worth keeping a tamper-evident record of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<()>;
}

/// Hash of the (absent) entry before the first one
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An audit event linked to its predecessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub event: AuditEvent,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditRecord {
    fn compute_hash(sequence: u64, event: &AuditEvent, previous_hash: &str) -> Result<String> {
        let body = serde_json::to_vec(&(sequence, event, previous_hash))?;
        Ok(format!("{:x}", Sha256::digest(&body)))
    }
}

/// Audit log kept in memory as a SHA-256 hash chain
///
/// Every record hashes its sequence number, its event and the previous
/// record's hash, so editing or dropping an entry breaks every hash after it.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Index of the first record whose link or hash does not check out
    pub fn first_broken_link(&self) -> Option<usize> {
        verify_chain(&self.records.lock())
    }
}

/// Walk a chain from the genesis hash; `None` when every record is intact
pub fn verify_chain(records: &[AuditRecord]) -> Option<usize> {
    let mut previous = GENESIS_HASH.to_string();
    for (idx, record) in records.iter().enumerate() {
        let expected = AuditRecord::compute_hash(record.sequence, &record.event, &previous).ok();
        if record.previous_hash != previous || expected.as_deref() != Some(record.hash.as_str()) {
            return Some(idx);
        }
        previous = record.hash.clone();
    }
    None
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        let mut records = self.records.lock();
        let previous_hash = records
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |r| r.hash.clone());
        let sequence = records.len() as u64;
        let hash = AuditRecord::compute_hash(sequence, &event, &previous_hash)?;
        records.push(AuditRecord {
            sequence,
            event,
            previous_hash,
            hash,
        });
        Ok(())
    }
}
