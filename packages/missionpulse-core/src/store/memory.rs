//! In-process row store.
//!
//! Backs development servers and tests. Rows keep insertion order; ids are
//! random UUIDs; `created_at`/`updated_at` are stamped on write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{compare_values, FetchQuery, RowStore};
use crate::error::StoreError;
use crate::record::{values_equal, Fields, Record, RecordId};

/// Row store holding all tables in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Map of table name to rows in insertion order
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Returns a copy of every row in a table.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn matches_filters(record: &Record, query: &FetchQuery) -> bool {
    query.filters.iter().all(|(field, expected)| {
        let actual = if field == "id" {
            Some(Value::String(record.id.as_str().to_string()))
        } else {
            record.fields.get(field).cloned()
        };
        actual.is_some_and(|v| values_equal(&v, expected))
    })
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch_all(&self, table: &str, query: &FetchQuery) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<Record> = rows
            .iter()
            .filter(|r| matches_filters(r, query))
            .cloned()
            .collect();

        if let Some(field) = &query.order_by {
            // Stable sort keeps insertion order among equal keys
            selected.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                if query.ascending {
                    ord
                } else {
                    // Nulls stay last when descending
                    match (a.get(field), b.get(field)) {
                        (Some(_), Some(_)) => ord.reverse(),
                        _ => ord,
                    }
                }
            });
        }

        selected.truncate(query.limit);
        Ok(selected)
    }

    async fn fetch_one(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| &r.id == id))
            .cloned())
    }

    async fn insert(&self, table: &str, mut fields: Fields) -> Result<Record, StoreError> {
        let stamp = now_stamp();
        fields.insert("created_at".to_string(), stamp.clone());
        fields.insert("updated_at".to_string(), stamp);

        let record = Record {
            id: RecordId::new(Uuid::new_v4().to_string()),
            fields,
        };

        let mut tables = self.tables.write();
        tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.tables.write();
        let Some(record) = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| &r.id == id))
        else {
            return Ok(None);
        };

        for (field, value) in fields {
            record.fields.insert(field, value);
        }
        record.fields.insert("updated_at".to_string(), now_stamp());
        Ok(Some(record.clone()))
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        Ok(rows.len() != before)
    }
}
