//! Tracked table CRUD handlers.
//!
//! Reads go straight to the row store. Writes go through the mutation
//! gateway, which validates, applies and audits them.

use hyper::header::HeaderValue;
use hyper::{body::Bytes, Request, Response};

use crate::router::{AppState, RouterError};
use missionpulse_core::gateway::{AuditStatus, Mutation};
use missionpulse_core::store::FetchQuery;
use missionpulse_core::RecordId;

use super::request_utils::{
    json_response, parse_json_object, parse_limit, parse_list_query, parse_query_pairs,
};
use super::response::{list_response, DeleteResponse};

/// Response header reporting whether the mutation's audit record was written.
pub const AUDIT_STATUS_HEADER: &str = "x-audit-status";

/// Lists records of a tracked table.
///
/// # Endpoint
/// `GET /api/data/{table}`
///
/// # Query
/// - `limit`: defaulted and clamped to the table cap
/// - any other parameter: equality filter on that field
///
/// # Response
/// - **200 OK**: `{"data": [...], "count": n}`
///
/// # Errors
/// - **400 Bad Request**: Unknown filter field or unparseable value
/// - **401 Unauthorized**: Missing or invalid credentials
pub async fn list_records(
    req: Request<Bytes>,
    table: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    state.authenticate(&req).await?;
    let schema = state.schema(table)?;
    let query = parse_list_query(schema, req.uri().query())?;

    let rows = state.bounded_read(state.store.fetch_all(table, &query)).await?;
    json_response(200, &list_response(rows))
}

/// Reads one record.
///
/// # Endpoint
/// `GET /api/data/{table}/{id}`
///
/// # Errors
/// - **404 Not Found**: Record not found
pub async fn read_record(
    req: Request<Bytes>,
    table: &str,
    id: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    state.authenticate(&req).await?;
    state.schema(table)?;

    let record = state
        .bounded_read(state.store.fetch_one(table, &RecordId::from(id)))
        .await?
        .ok_or_else(|| RouterError::NotFound("Record not found".to_string()))?;
    json_response(200, &record)
}

/// Creates a record.
///
/// # Endpoint
/// `POST /api/data/{table}`
///
/// # Request Body
/// ```json
/// {"title": "DHA EHR Modernization", "agency": "DHA"}
/// ```
///
/// # Response
/// - **201 Created**: The stored record including its assigned `id`
///
/// # Errors
/// - **400 Bad Request**: Body is not a JSON object
/// - **422 Unprocessable Entity**: Schema violation
pub async fn create_record(
    req: Request<Bytes>,
    table: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let actor = state.authenticate(&req).await?;
    let fields = parse_json_object(req.body())?;

    let mutation = state.gateway.create(table, fields, &actor).await?;
    mutation_response(201, mutation)
}

/// Partially updates a record.
///
/// # Endpoint
/// `PATCH /api/data/{table}/{id}`
///
/// # Errors
/// - **400 Bad Request**: No fields left after dropping nulls
/// - **404 Not Found**: Record not found
/// - **422 Unprocessable Entity**: Schema violation
pub async fn update_record(
    req: Request<Bytes>,
    table: &str,
    id: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let actor = state.authenticate(&req).await?;
    let fields = parse_json_object(req.body())?;

    let mutation = state
        .gateway
        .update(table, &RecordId::from(id), fields, &actor)
        .await?;
    mutation_response(200, mutation)
}

/// Deletes a record.
///
/// # Endpoint
/// `DELETE /api/data/{table}/{id}`
///
/// # Response
/// - **200 OK**: `{"deleted": true}`, or `{"deleted": false}` when the
///   record did not exist
pub async fn delete_record(
    req: Request<Bytes>,
    table: &str,
    id: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let actor = state.authenticate(&req).await?;

    let mutation = state
        .gateway
        .delete(table, &RecordId::from(id), &actor)
        .await?;
    let audit = mutation.audit;
    let response = json_response(
        200,
        &DeleteResponse {
            deleted: mutation.value,
        },
    )?;
    Ok(with_audit_status(response, &audit))
}

/// Lists the sections of one proposal outline in document order.
///
/// # Endpoint
/// `GET /api/data/outlines/{id}/sections`
pub async fn list_outline_sections(
    req: Request<Bytes>,
    outline_id: &str,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    state.authenticate(&req).await?;
    let schema = state.schema("outline_sections")?;

    let mut limit = None;
    for (key, value) in parse_query_pairs(req.uri().query()) {
        if key == "limit" {
            limit = Some(parse_limit(&value)?);
        }
    }

    let mut query = FetchQuery::new(schema.clamp_limit(limit))
        .filter("outline_id", serde_json::Value::from(outline_id));
    if let Some(order) = &schema.order {
        query = query.order_by(order.field.clone(), order.ascending);
    }

    let rows = state
        .bounded_read(state.store.fetch_all(&schema.name, &query))
        .await?;
    json_response(200, &list_response(rows))
}

fn mutation_response<T: serde::Serialize>(
    status: u16,
    mutation: Mutation<T>,
) -> Result<Response<Bytes>, RouterError> {
    let response = json_response(status, &mutation.value)?;
    Ok(with_audit_status(response, &mutation.audit))
}

fn with_audit_status(mut response: Response<Bytes>, audit: &AuditStatus) -> Response<Bytes> {
    if let Some(value) = audit.header_value() {
        response
            .headers_mut()
            .insert(AUDIT_STATUS_HEADER, HeaderValue::from_static(value));
    }
    response
}
