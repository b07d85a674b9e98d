//! Row store collaborator.
//!
//! The row store owns persistence: id assignment, partial merges, and
//! retry policy. Filters are equality-only conjunctions.

mod memory;
mod postgrest;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::record::{Fields, Record, RecordId};

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

/// Equality filters, field name to expected value.
pub type Filters = BTreeMap<String, Value>;

/// Bulk read parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    /// Field equality filters (all must match)
    pub filters: Filters,
    /// Field to order by
    pub order_by: Option<String>,
    /// Sort direction for `order_by`
    pub ascending: bool,
    /// Maximum number of rows to return
    pub limit: usize,
}

impl FetchQuery {
    /// Unfiltered, unordered read of up to `limit` rows.
    pub fn new(limit: usize) -> Self {
        Self {
            filters: Filters::new(),
            order_by: None,
            ascending: true,
            limit,
        }
    }

    /// Adds an equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    /// Orders results by `field`.
    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(field.into());
        self.ascending = ascending;
        self
    }
}

/// Tabular persistence keyed by table name and record id.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Returns up to `query.limit` rows matching all filters.
    async fn fetch_all(&self, table: &str, query: &FetchQuery) -> Result<Vec<Record>, StoreError>;

    /// Returns one row by id, or `None` if it does not exist.
    async fn fetch_one(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Inserts a row and returns it with its store-assigned id.
    async fn insert(&self, table: &str, fields: Fields) -> Result<Record, StoreError>;

    /// Merges `fields` into an existing row.
    ///
    /// Returns the updated row, or `None` if no row has this id.
    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Option<Record>, StoreError>;

    /// Deletes a row. Returns true if a row was removed.
    async fn delete(&self, table: &str, id: &RecordId) -> Result<bool, StoreError>;
}

/// Orders two optional field values: nulls last, numbers numerically,
/// everything else by JSON text.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
