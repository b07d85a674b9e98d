//! Read-only audit log handler.

use hyper::{body::Bytes, Request, Response};

use crate::router::{AppState, RouterError};
use missionpulse_core::audit::{AuditAction, AuditFilter};
use missionpulse_core::RecordId;

use super::request_utils::{json_response, parse_limit, parse_query_pairs};
use super::response::list_response;

/// Lists audit records, newest first.
///
/// # Endpoint
/// `GET /api/data/audit-logs`
///
/// # Query
/// - `table_name`, `record_id`, `action` (CREATE, UPDATE or DELETE): filters
/// - `limit`: default 50, capped at 200
pub async fn list_audit_logs(
    req: Request<Bytes>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    state.authenticate(&req).await?;
    let filter = parse_audit_filter(
        req.uri().query(),
        state.config.audit_limit_default,
        state.config.audit_limit_cap,
    )?;

    let records = state.bounded_read(state.audit.query(&filter)).await?;
    json_response(200, &list_response(records))
}

fn parse_audit_filter(
    query_str: Option<&str>,
    default_limit: usize,
    max_limit: usize,
) -> Result<AuditFilter, RouterError> {
    let mut filter = AuditFilter::new(default_limit);
    for (key, value) in parse_query_pairs(query_str) {
        match key.as_str() {
            "table_name" => filter = filter.table(value),
            "record_id" => filter = filter.record(RecordId::new(value)),
            "action" => {
                let action: AuditAction = value.parse().map_err(RouterError::BadRequest)?;
                filter = filter.action(action);
            }
            "limit" => filter.limit = parse_limit(&value)?,
            _ => {}
        }
    }
    filter.limit = filter.limit.min(max_limit);
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audit_filter() {
        let filter =
            parse_audit_filter(Some("table_name=opportunities&action=delete"), 50, 200).unwrap();
        assert_eq!(filter.table_name.as_deref(), Some("opportunities"));
        assert_eq!(filter.action, Some(AuditAction::Delete));
        assert_eq!(filter.limit, 50);

        let filter = parse_audit_filter(Some("limit=5000&record_id=o1"), 50, 200).unwrap();
        assert_eq!(filter.limit, 200);
        assert_eq!(filter.record_id, Some(RecordId::from("o1")));

        assert!(matches!(
            parse_audit_filter(Some("action=TRUNCATE"), 50, 200),
            Err(RouterError::BadRequest(_))
        ));
    }
}
