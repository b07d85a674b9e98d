//! Tracked table schemas.
//!
//! Each tracked table declares its route path, field specs, list limits and
//! default ordering. The registry is built once at startup and shared.

mod builtin;
mod validation;

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

pub use builtin::{builtin_tables, AUDIT_LOG_TABLE};
pub use validation::{coerce_filter_value, validate_create, validate_update};

/// Scalar kind accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Boolean,
}

impl FieldKind {
    /// Returns true if `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => {
                value.is_i64() || value.is_u64() || whole_float(value).is_some()
            }
            FieldKind::Boolean => value.is_boolean(),
        }
    }

    /// Rewrites a whole-valued float such as `40.0` as an integer on
    /// integer fields. Other values are left as they are.
    pub fn narrow(&self, value: &mut Value) {
        if *self == FieldKind::Integer && value.is_f64() {
            if let Some(n) = whole_float(value) {
                *value = Value::from(n);
            }
        }
    }
}

fn whole_float(value: &Value) -> Option<i64> {
    let f = value.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0)?;
    (f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Value filled in on create when the caller omits a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// A fixed JSON value
    Value(Value),
    /// Current UTC time as RFC 3339 text
    Now,
}

/// Field definition within a tracked table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Column name
    pub name: String,
    /// Accepted scalar kind
    pub kind: FieldKind,
    /// Must be present on create
    pub required: bool,
    /// Default applied on create
    pub default: Option<FieldDefault>,
    /// Minimum text length in characters
    pub min_len: Option<usize>,
    /// Maximum text length in characters
    pub max_len: Option<usize>,
}

impl FieldSpec {
    /// Optional field of the given kind.
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            min_len: None,
            max_len: None,
        }
    }

    /// Optional text field.
    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Marks the field as required on create.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets a fixed default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    /// Defaults the field to the creation time.
    pub fn default_now(mut self) -> Self {
        self.default = Some(FieldDefault::Now);
        self
    }

    /// Bounds text length.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }
}

/// Default ordering for list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOrder {
    pub field: String,
    pub ascending: bool,
}

/// Schema of one tracked table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Table name in the row store
    pub name: String,
    /// Collection path below `/api`, e.g. `data/win-themes`
    pub path: String,
    /// Field definitions
    pub fields: Vec<FieldSpec>,
    /// Accept fields not listed in `fields`
    pub open: bool,
    /// Column stamped with the acting user's id on create
    pub actor_column: Option<String>,
    /// Default ordering for list queries
    pub order: Option<ListOrder>,
    /// List limit when the caller gives none
    pub default_limit: usize,
    /// Largest list limit honored
    pub max_limit: usize,
}

impl TableSchema {
    /// Creates a strict schema with the standard 50/200 list limits.
    pub fn new(name: &str, path: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            fields,
            open: false,
            actor_column: None,
            order: None,
            default_limit: 50,
            max_limit: 200,
        }
    }

    /// Accepts fields beyond the declared ones.
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// Stamps `column` with the actor id on create.
    pub fn stamp_actor(mut self, column: &str) -> Self {
        self.actor_column = Some(column.to_string());
        self
    }

    /// Sets the default list ordering.
    pub fn ordered_by(mut self, field: &str, ascending: bool) -> Self {
        self.order = Some(ListOrder {
            field: field.to_string(),
            ascending,
        });
        self
    }

    /// Sets list limit default and cap.
    pub fn limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    /// Looks up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolves a caller-supplied limit against this table's default and cap.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

/// Registry of tracked tables, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
    order: Vec<String>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the MissionPulse tracked tables.
    pub fn with_builtin_tables() -> Self {
        let mut registry = Self::new();
        for table in builtin_tables() {
            registry.register(table);
        }
        registry
    }

    /// Adds or replaces a table schema.
    pub fn register(&mut self, schema: TableSchema) {
        if !self.tables.contains_key(&schema.name) {
            self.order.push(schema.name.clone());
        }
        self.tables.insert(schema.name.clone(), schema);
    }

    /// Gets a table schema by table name.
    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    /// Iterates schemas in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.order.iter().filter_map(|name| self.tables.get(name))
    }

    /// Returns tracked table names in registration order.
    pub fn table_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns the number of tracked tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no tables are tracked.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
