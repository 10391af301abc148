//! Relational record store contract.
//!
//! Business rows are addressed by `(table, id)`. Only primary-key access is
//! needed by the write and ingress paths.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::StoreError;

/// A business row committed locally and pushed to backup regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Record {
    pub fn new(table: impl Into<String>, id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            data,
        }
    }

    /// Cache key for this row.
    pub fn cache_key(&self) -> String {
        record_cache_key(&self.table, &self.id)
    }
}

pub fn record_cache_key(table: &str, id: &str) -> String {
    format!("{}:{}", table, id)
}

/// Primary-key access to business records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the row with the record's primary key.
    async fn upsert(&self, record: Record) -> Result<(), StoreError>;

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Returns true if a row was removed.
    async fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError>;
}

/// In-process [`RecordStore`].
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    rows: Arc<DashMap<(String, String), Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert(&self, record: Record) -> Result<(), StoreError> {
        self.rows
            .insert((record.table.clone(), record.id.clone()), record);
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .rows
            .get(&(table.to_string(), id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .remove(&(table.to_string(), id.to_string()))
            .is_some())
    }
}
