//! Append-only replication log.
//!
//! The contract has no update or delete: rows are the permanent record of
//! each attempt's outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

use crate::replication::types::ReplicationLogEntry;
use crate::store::StoreError;

#[async_trait]
pub trait ReplicationLog: Send + Sync {
    async fn append(&self, entry: ReplicationLogEntry) -> Result<(), StoreError>;

    /// Rows with `timestamp >= since`, oldest first.
    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<ReplicationLogEntry>, StoreError>;

    /// The newest `limit` rows, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ReplicationLogEntry>, StoreError>;
}

/// In-process [`ReplicationLog`].
#[derive(Clone, Default)]
pub struct MemoryReplicationLog {
    rows: Arc<RwLock<Vec<ReplicationLogEntry>>>,
}

impl MemoryReplicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row in append order.
    pub fn all(&self) -> Vec<ReplicationLogEntry> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReplicationLog for MemoryReplicationLog {
    async fn append(&self, entry: ReplicationLogEntry) -> Result<(), StoreError> {
        self.rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<ReplicationLogEntry>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<ReplicationLogEntry> = rows
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect();
        hits.sort_by_key(|e| e.timestamp);
        Ok(hits)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ReplicationLogEntry>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }
}
