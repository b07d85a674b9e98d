//! Audit sink collaborator.
//!
//! Every committed mutation produces exactly one audit record. Records are
//! append-only; sinks expose them newest first.

mod jsonl_sink;
mod table_sink;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::{Fields, RecordId};

pub use jsonl_sink::JsonlAuditSink;
pub use table_sink::TableAuditSink;

/// Kind of mutation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            _ => Err(format!("Unknown audit action '{}'", s)),
        }
    }
}

/// Audit record as handed to a sink, before the sink assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: RecordId,
    pub actor_id: String,
    /// Changed-field snapshot (updates only)
    pub changed_fields: Option<Fields>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        table_name: impl Into<String>,
        record_id: RecordId,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            table_name: table_name.into(),
            record_id,
            actor_id: actor_id.into(),
            changed_fields: None,
        }
    }

    /// Attaches the changed-field snapshot.
    pub fn with_changes(mut self, changes: Fields) -> Self {
        self.changed_fields = Some(changes);
        self
    }

    /// Completes the entry with sink-assigned identity and timestamp.
    pub fn into_record(self, id: impl Into<String>, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: id.into(),
            action: self.action,
            table_name: self.table_name,
            record_id: self.record_id,
            actor_id: self.actor_id,
            changed_fields: self.changed_fields,
            created_at,
        }
    }
}

/// Durable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: RecordId,
    #[serde(rename = "user_id")]
    pub actor_id: String,
    #[serde(rename = "new_values", default, skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Fields>,
    pub created_at: DateTime<Utc>,
}

/// Read-side filter for audit queries.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditFilter {
    pub table_name: Option<String>,
    pub record_id: Option<RecordId>,
    pub action: Option<AuditAction>,
    pub limit: usize,
}

impl AuditFilter {
    /// Unfiltered query for the newest `limit` records.
    pub fn new(limit: usize) -> Self {
        Self {
            table_name: None,
            record_id: None,
            action: None,
            limit,
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn record(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Returns true if `record` passes every set filter.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.table_name
            .as_ref()
            .map_or(true, |t| &record.table_name == t)
            && self
                .record_id
                .as_ref()
                .map_or(true, |id| &record.record_id == id)
            && self.action.map_or(true, |a| record.action == a)
    }
}

/// Append-only store of audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably appends an entry and returns the stored record.
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError>;

    /// Returns matching records, newest first, at most `filter.limit`.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError>;
}
