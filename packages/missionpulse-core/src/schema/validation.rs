//! Change request validation against table schemas.
//!
//! All checks run before any store call. Null values are stripped first, so
//! an explicit `null` behaves like an omitted field.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::{FieldDefault, FieldKind, TableSchema};
use crate::error::CoreError;
use crate::record::{Fields, STORE_MANAGED_FIELDS};

/// Validates a create request and returns the row to insert.
///
/// Applies schema defaults, stamps the actor column, and checks required
/// fields after defaults are filled in.
///
/// # Errors
/// `CoreError::Validation` on any schema violation.
pub fn validate_create(
    schema: &TableSchema,
    fields: Fields,
    actor_id: &str,
) -> Result<Fields, CoreError> {
    let mut row = check_fields(schema, strip_nulls(fields))?;

    for spec in &schema.fields {
        if row.contains_key(&spec.name) {
            continue;
        }
        match &spec.default {
            Some(FieldDefault::Value(v)) => {
                row.insert(spec.name.clone(), v.clone());
            }
            Some(FieldDefault::Now) => {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
                row.insert(spec.name.clone(), Value::String(now));
            }
            None => {}
        }
    }

    if let Some(column) = &schema.actor_column {
        row.insert(column.clone(), Value::String(actor_id.to_string()));
    }

    if let Some(missing) = schema
        .fields
        .iter()
        .find(|spec| spec.required && !row.contains_key(&spec.name))
    {
        return Err(CoreError::validation(format!(
            "Field '{}' is required",
            missing.name
        )));
    }

    Ok(row)
}

/// Validates an update request and returns the changed-field set.
///
/// # Errors
/// `CoreError::EmptyChange` when nothing is left after stripping nulls,
/// `CoreError::Validation` on any schema violation.
pub fn validate_update(schema: &TableSchema, fields: Fields) -> Result<Fields, CoreError> {
    let changes = strip_nulls(fields);
    if changes.is_empty() {
        return Err(CoreError::EmptyChange);
    }
    let changes = check_fields(schema, changes)?;

    if let Some(column) = &schema.actor_column {
        if changes.contains_key(column) {
            return Err(CoreError::validation(format!(
                "Field '{}' is managed by the server",
                column
            )));
        }
    }

    Ok(changes)
}

/// Converts a raw query-string filter value into the JSON value stored for
/// `field`.
///
/// Typed fields parse according to their kind. Fields of an open schema
/// try JSON first and fall back to a string.
///
/// # Errors
/// `CoreError::Validation` for unknown fields on strict tables or values that
/// do not parse as the field's kind.
pub fn coerce_filter_value(
    schema: &TableSchema,
    field: &str,
    raw: &str,
) -> Result<Value, CoreError> {
    let Some(spec) = schema.field(field) else {
        if schema.open || field == "id" {
            return Ok(serde_json::from_str::<Value>(raw)
                .ok()
                .filter(is_scalar)
                .unwrap_or_else(|| Value::String(raw.to_string())));
        }
        return Err(CoreError::validation(format!(
            "Cannot filter '{}' on unknown field '{}'",
            schema.name, field
        )));
    };

    let parsed = match spec.kind {
        FieldKind::Text => Some(Value::String(raw.to_string())),
        FieldKind::Integer => raw.parse::<i64>().ok().map(Value::from),
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        FieldKind::Boolean => raw.parse::<bool>().ok().map(Value::Bool),
    };
    parsed.ok_or_else(|| {
        CoreError::validation(format!(
            "Filter value '{}' for field '{}' is not a valid {}",
            raw, field, spec.kind
        ))
    })
}

fn strip_nulls(fields: Fields) -> Fields {
    fields.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

fn is_scalar(value: &Value) -> bool {
    !(value.is_array() || value.is_object())
}

/// Checks every field against the schema and returns the fields with
/// whole-valued floats on integer fields narrowed to integers.
fn check_fields(schema: &TableSchema, mut fields: Fields) -> Result<Fields, CoreError> {
    for (name, value) in fields.iter_mut() {
        if STORE_MANAGED_FIELDS.contains(&name.as_str()) {
            return Err(CoreError::validation(format!(
                "Field '{}' is managed by the store",
                name
            )));
        }

        let Some(spec) = schema.field(name) else {
            if !schema.open {
                return Err(CoreError::validation(format!(
                    "Unknown field '{}' for table '{}'",
                    name, schema.name
                )));
            }
            if !is_scalar(value) {
                return Err(CoreError::validation(format!(
                    "Field '{}' must be a scalar value",
                    name
                )));
            }
            continue;
        };

        if !spec.kind.accepts(value) {
            return Err(CoreError::validation(format!(
                "Field '{}' must be {}",
                name, spec.kind
            )));
        }
        spec.kind.narrow(value);

        if let Value::String(text) = value {
            let len = text.chars().count();
            if spec.min_len.is_some_and(|min| len < min) {
                return Err(CoreError::validation(format!(
                    "Field '{}' must be at least {} characters",
                    name,
                    spec.min_len.unwrap_or_default()
                )));
            }
            if spec.max_len.is_some_and(|max| len > max) {
                return Err(CoreError::validation(format!(
                    "Field '{}' must be at most {} characters",
                    name,
                    spec.max_len.unwrap_or_default()
                )));
            }
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::with_builtin_tables()
    }

    #[test]
    fn test_create_applies_defaults() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        let row = validate_create(schema, fields(json!({"title": "X"})), "user_1").unwrap();
        assert_eq!(row.get("phase"), Some(&json!("qualify")));
        assert_eq!(row.get("priority"), Some(&json!("P-2")));
        assert!(row.get("pwin").is_none());
    }

    #[test]
    fn test_create_keeps_caller_values_over_defaults() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        let row = validate_create(
            schema,
            fields(json!({"title": "X", "phase": "negotiate"})),
            "user_1",
        )
        .unwrap();
        assert_eq!(row.get("phase"), Some(&json!("negotiate")));
    }

    #[test]
    fn test_create_requires_fields() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        let err = validate_create(schema, fields(json!({"agency": "DHA"})), "u").unwrap_err();
        assert_eq!(err, CoreError::validation("Field 'title' is required"));

        // An explicit null is the same as leaving the field out
        let err = validate_create(schema, fields(json!({"title": null})), "u").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_create_rejects_wrong_kind_and_unknown_fields() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();

        let err = validate_create(schema, fields(json!({"title": "X", "pwin": "high"})), "u")
            .unwrap_err();
        assert_eq!(err, CoreError::validation("Field 'pwin' must be integer"));

        let err = validate_create(schema, fields(json!({"title": "X", "colour": "red"})), "u")
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("Unknown field")));
    }

    #[test]
    fn test_whole_floats_are_narrowed_on_integer_fields() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();

        let row = validate_create(schema, fields(json!({"title": "X", "pwin": 40.0})), "u")
            .unwrap();
        assert_eq!(row.get("pwin"), Some(&json!(40)));
        assert!(row["pwin"].is_i64());

        let changes = validate_update(schema, fields(json!({"pwin": 55.0}))).unwrap();
        assert!(changes["pwin"].is_i64());

        let err = validate_create(schema, fields(json!({"title": "X", "pwin": 40.5})), "u")
            .unwrap_err();
        assert_eq!(err, CoreError::validation("Field 'pwin' must be integer"));
    }

    #[test]
    fn test_create_rejects_store_managed_fields() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        let err =
            validate_create(schema, fields(json!({"title": "X", "id": "mine"})), "u").unwrap_err();
        assert_eq!(err, CoreError::validation("Field 'id' is managed by the store"));
    }

    #[test]
    fn test_create_stamps_actor_column() {
        let registry = registry();
        let schema = registry.get("projects").unwrap();
        let row = validate_create(
            schema,
            fields(json!({"name": "DHA EHR", "created_by": "someone_else"})),
            "exec_001",
        )
        .unwrap();
        assert_eq!(row.get("created_by"), Some(&json!("exec_001")));
    }

    #[test]
    fn test_create_enforces_text_length() {
        let registry = registry();
        let schema = registry.get("projects").unwrap();

        let err = validate_create(schema, fields(json!({"name": ""})), "u").unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("at least 1")));

        let long = "x".repeat(81);
        let err = validate_create(schema, fields(json!({"name": long})), "u").unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("at most 80")));

        let exact = "x".repeat(80);
        assert!(validate_create(schema, fields(json!({"name": exact})), "u").is_ok());
    }

    #[test]
    fn test_create_default_now_for_assignments() {
        let registry = registry();
        let schema = registry.get("team_assignments").unwrap();
        let row = validate_create(schema, fields(json!({"role": "Volume Lead"})), "u").unwrap();
        let stamp = row.get("assigned_at").and_then(Value::as_str).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert_eq!(row.get("is_active"), Some(&json!(true)));
    }

    #[test]
    fn test_open_schema_accepts_scalar_extras_only() {
        let registry = registry();
        let schema = registry.get("compliance_items").unwrap();
        assert!(validate_update(schema, fields(json!({"status": "Compliant"}))).is_ok());

        let err = validate_update(schema, fields(json!({"refs": [1, 2]}))).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_update_empty_after_null_strip() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        assert_eq!(
            validate_update(schema, Fields::new()).unwrap_err(),
            CoreError::EmptyChange
        );
        assert_eq!(
            validate_update(schema, fields(json!({"title": null}))).unwrap_err(),
            CoreError::EmptyChange
        );
    }

    #[test]
    fn test_update_returns_only_changed_fields() {
        let registry = registry();
        let schema = registry.get("opportunities").unwrap();
        let changes =
            validate_update(schema, fields(json!({"pwin": 55, "agency": null}))).unwrap();
        assert_eq!(changes, fields(json!({"pwin": 55})));
    }

    #[test]
    fn test_update_cannot_rewrite_actor_column() {
        let registry = registry();
        let schema = registry.get("projects").unwrap();
        let err = validate_update(schema, fields(json!({"created_by": "x"}))).unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("managed by the server")));
    }

    #[test]
    fn test_coerce_filter_value() {
        let registry = registry();
        let opportunities = registry.get("opportunities").unwrap();
        assert_eq!(
            coerce_filter_value(opportunities, "phase", "qualify").unwrap(),
            json!("qualify")
        );
        assert_eq!(
            coerce_filter_value(opportunities, "pwin", "40").unwrap(),
            json!(40)
        );
        assert!(coerce_filter_value(opportunities, "pwin", "forty").is_err());
        assert!(coerce_filter_value(opportunities, "colour", "red").is_err());

        // Text fields keep numeric-looking values as text
        assert_eq!(
            coerce_filter_value(opportunities, "solicitation_number", "123").unwrap(),
            json!("123")
        );

        let compliance = registry.get("compliance_items").unwrap();
        assert_eq!(
            coerce_filter_value(compliance, "mandatory", "true").unwrap(),
            json!(true)
        );
        assert_eq!(
            coerce_filter_value(compliance, "section", "{broken").unwrap(),
            json!("{broken")
        );
    }
}
