//! MissionPulse tracked tables.

use serde_json::json;

use super::{FieldKind, FieldSpec, TableSchema};

/// Table holding audit records when audit rows live in the row store.
pub const AUDIT_LOG_TABLE: &str = "audit_logs";

/// Returns the tracked tables in route registration order.
pub fn builtin_tables() -> Vec<TableSchema> {
    vec![
        opportunities(),
        past_performance(),
        win_themes(),
        team_assignments(),
        proposal_outlines(),
        outline_sections(),
        competitors(),
        compliance_items(),
        projects(),
    ]
}

fn opportunities() -> TableSchema {
    TableSchema::new(
        "opportunities",
        "data/opportunities",
        vec![
            FieldSpec::text("title").required(),
            FieldSpec::text("agency"),
            FieldSpec::text("solicitation_number"),
            FieldSpec::text("contract_type"),
            FieldSpec::new("estimated_value", FieldKind::Number),
            FieldSpec::text("phase").default_value(json!("qualify")),
            FieldSpec::text("priority").default_value(json!("P-2")),
            FieldSpec::new("pwin", FieldKind::Integer),
        ],
    )
}

fn past_performance() -> TableSchema {
    TableSchema::new(
        "past_performance",
        "data/past-performance",
        vec![
            FieldSpec::text("opportunity_id"),
            FieldSpec::text("contract_name").required(),
            FieldSpec::text("contract_number"),
            FieldSpec::text("agency"),
            FieldSpec::new("contract_value", FieldKind::Number),
            FieldSpec::text("period_of_performance"),
            FieldSpec::text("relevance"),
            FieldSpec::text("cpars_rating").default_value(json!("Satisfactory")),
        ],
    )
}

fn win_themes() -> TableSchema {
    TableSchema::new(
        "win_themes",
        "data/win-themes",
        vec![
            FieldSpec::text("opportunity_id"),
            FieldSpec::text("theme").required(),
            FieldSpec::text("discriminator"),
            FieldSpec::text("evidence"),
            FieldSpec::new("priority", FieldKind::Integer).default_value(json!(1)),
        ],
    )
    .ordered_by("priority", true)
}

fn team_assignments() -> TableSchema {
    TableSchema::new(
        "team_assignments",
        "data/team-assignments",
        vec![
            FieldSpec::text("opportunity_id"),
            FieldSpec::text("user_id"),
            FieldSpec::text("role").required(),
            FieldSpec::new("is_active", FieldKind::Boolean).default_value(json!(true)),
            FieldSpec::text("assigned_at").default_now(),
        ],
    )
    .ordered_by("assigned_at", false)
}

fn proposal_outlines() -> TableSchema {
    TableSchema::new(
        "proposal_outlines",
        "data/outlines",
        vec![
            FieldSpec::text("opportunity_id"),
            FieldSpec::text("volume").default_value(json!("Technical")),
        ],
    )
}

fn outline_sections() -> TableSchema {
    TableSchema::new(
        "outline_sections",
        "data/outlines/sections",
        vec![
            FieldSpec::text("outline_id").required(),
            FieldSpec::text("title").required(),
            FieldSpec::text("parent_id"),
            FieldSpec::new("order_index", FieldKind::Integer).default_value(json!(0)),
            FieldSpec::new("page_limit", FieldKind::Integer),
            FieldSpec::text("status").default_value(json!("Not Started")),
        ],
    )
    .ordered_by("order_index", true)
}

fn competitors() -> TableSchema {
    TableSchema::new(
        "competitors",
        "data/competitors",
        vec![
            FieldSpec::text("opportunity_id"),
            FieldSpec::text("name").required(),
            FieldSpec::text("strengths"),
            FieldSpec::text("weaknesses"),
            FieldSpec::new("incumbent", FieldKind::Boolean).default_value(json!(false)),
            FieldSpec::text("threat_level").default_value(json!("Medium")),
            FieldSpec::new("pwin_estimate", FieldKind::Integer),
        ],
    )
}

// Compliance rows are shredded from RFPs with columns that vary per source
// document, so only the join key is typed.
fn compliance_items() -> TableSchema {
    TableSchema::new(
        "compliance_items",
        "data/compliance",
        vec![FieldSpec::text("opportunity_id")],
    )
    .open()
    .limits(100, 500)
}

fn projects() -> TableSchema {
    TableSchema::new(
        "projects",
        "projects",
        vec![
            FieldSpec::text("name").required().length(1, 80),
            FieldSpec::text("description"),
            FieldSpec::text("created_by"),
        ],
    )
    .stamp_actor("created_by")
}
