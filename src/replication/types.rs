//! Replication data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::store::Record;

/// Kind of write being replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    Success,
    Failed,
}

impl ReplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationStatus::Success => "success",
            ReplicationStatus::Failed => "failed",
        }
    }
}

/// Lifecycle of a single push task.
///
/// ```text
/// Created → InFlight → Succeeded
///                    → Failed
/// Created → Failed            (queue full)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    InFlight,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::InFlight)
                | (TaskState::Created, TaskState::Failed)
                | (TaskState::InFlight, TaskState::Succeeded)
                | (TaskState::InFlight, TaskState::Failed)
        )
    }
}

/// Wire body pushed to a backup region's ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationEnvelope {
    pub source_region: String,
    pub operation: Operation,
    pub record: Record,
    pub sent_at: DateTime<Utc>,
}

/// Permanent record of one replication attempt. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationLogEntry {
    pub id: Uuid,
    pub source_region: String,
    pub target_region: String,
    pub operation: Operation,
    pub table: String,
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: ReplicationStatus,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
