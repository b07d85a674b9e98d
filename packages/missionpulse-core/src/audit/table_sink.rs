//! Audit sink writing rows to the `audit_logs` table of a row store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{AuditAction, AuditEntry, AuditFilter, AuditRecord, AuditSink};
use crate::error::StoreError;
use crate::record::{Fields, Record, RecordId};
use crate::schema::AUDIT_LOG_TABLE;
use crate::store::{FetchQuery, RowStore};

/// Audit sink backed by a row store table.
pub struct TableAuditSink {
    store: Arc<dyn RowStore>,
    table: String,
}

impl TableAuditSink {
    /// Writes audit rows to `audit_logs`.
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self::with_table(store, AUDIT_LOG_TABLE)
    }

    /// Writes audit rows to a custom table.
    pub fn with_table(store: Arc<dyn RowStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

fn entry_row(entry: &AuditEntry) -> Fields {
    let mut row = Fields::new();
    row.insert("action".into(), Value::from(entry.action.as_str()));
    row.insert("table_name".into(), Value::from(entry.table_name.as_str()));
    row.insert("record_id".into(), Value::from(entry.record_id.as_str()));
    row.insert("user_id".into(), Value::from(entry.actor_id.as_str()));
    if let Some(changes) = &entry.changed_fields {
        row.insert("new_values".into(), Value::Object(changes.clone()));
    }
    row
}

fn text_field<'a>(record: &'a Record, field: &str) -> Result<&'a str, StoreError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MalformedResponse(format!("Audit row missing '{}'", field)))
}

fn audit_record(record: Record) -> Result<AuditRecord, StoreError> {
    let action = text_field(&record, "action")?
        .parse::<AuditAction>()
        .map_err(StoreError::MalformedResponse)?;
    let created_at = DateTime::parse_from_rfc3339(text_field(&record, "created_at")?)
        .map_err(|e| StoreError::MalformedResponse(format!("Bad audit timestamp: {}", e)))?
        .with_timezone(&Utc);
    let record_id = record
        .get("record_id")
        .and_then(RecordId::from_value)
        .ok_or_else(|| StoreError::MalformedResponse("Audit row missing 'record_id'".into()))?;

    Ok(AuditRecord {
        action,
        table_name: text_field(&record, "table_name")?.to_string(),
        record_id,
        actor_id: text_field(&record, "user_id")?.to_string(),
        changed_fields: record.get("new_values").and_then(Value::as_object).cloned(),
        created_at,
        id: record.id.to_string(),
    })
}

#[async_trait]
impl AuditSink for TableAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        let stored = self.store.insert(&self.table, entry_row(&entry)).await?;
        audit_record(stored)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let mut query = FetchQuery::new(filter.limit).order_by("created_at", false);
        if let Some(table) = &filter.table_name {
            query = query.filter("table_name", Value::from(table.as_str()));
        }
        if let Some(id) = &filter.record_id {
            query = query.filter("record_id", Value::from(id.as_str()));
        }
        if let Some(action) = filter.action {
            query = query.filter("action", Value::from(action.as_str()));
        }

        self.store
            .fetch_all(&self.table, &query)
            .await?
            .into_iter()
            .map(audit_record)
            .collect()
    }
}
