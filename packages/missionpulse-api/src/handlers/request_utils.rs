//! Request utilities for HTTP endpoints.

use std::fmt::Display;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Request, Response};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::Value;
use tokio::time;

use crate::router::RouterError;
use missionpulse_core::schema::{coerce_filter_value, TableSchema};
use missionpulse_core::store::FetchQuery;
use missionpulse_core::{CoreError, Fields};

/// Reads the whole request body, bounded by `timeout`.
pub async fn read_body_with_timeout<B>(body: B, timeout: Duration) -> Result<Bytes, RouterError>
where
    B: Body,
    B::Error: Display,
{
    let collected = time::timeout(timeout, body.collect())
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| RouterError::BadRequest(format!("Failed to read request body: {}", e)))?;
    Ok(collected.to_bytes())
}

/// Parses a JSON object body into a field map.
pub fn parse_json_object(body: &Bytes) -> Result<Fields, RouterError> {
    if body.is_empty() {
        return Err(RouterError::BadRequest("Request body is required".to_string()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(RouterError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(RouterError::BadRequest(format!("Failed to parse request: {}", e))),
    }
}

/// Returns the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token<T>(req: &Request<T>) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Splits a query string into percent-decoded key/value pairs.
pub fn parse_query_pairs(query_str: Option<&str>) -> Vec<(String, String)> {
    let Some(query_str) = query_str else {
        return Vec::new();
    };
    query_str
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parses a `limit` query value.
pub fn parse_limit(raw: &str) -> Result<usize, RouterError> {
    raw.trim()
        .parse()
        .map_err(|e| RouterError::BadRequest(format!("Invalid limit value '{}': {}", raw, e)))
}

/// Builds the bulk read for a list endpoint.
///
/// Every parameter except `limit` is an equality filter, coerced to the
/// field's kind. The limit is defaulted and clamped to the table cap, and the
/// table's default ordering applies.
pub fn parse_list_query(
    schema: &TableSchema,
    query_str: Option<&str>,
) -> Result<FetchQuery, RouterError> {
    let mut limit = None;
    let mut query = FetchQuery::new(schema.default_limit);

    for (key, value) in parse_query_pairs(query_str) {
        if key == "limit" {
            limit = Some(parse_limit(&value)?);
            continue;
        }
        let coerced = coerce_filter_value(schema, &key, &value).map_err(|e| match e {
            CoreError::Validation(msg) => RouterError::BadRequest(msg),
            other => RouterError::BadRequest(other.to_string()),
        })?;
        query = query.filter(key, coerced);
    }

    query.limit = schema.clamp_limit(limit);
    if let Some(order) = &schema.order {
        query = query.order_by(order.field.clone(), order.ascending);
    }
    Ok(query)
}

/// Helper to build HTTP response with proper error handling
pub fn build_response(status: u16, json: Vec<u8>) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Bytes::from(json))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

/// Serializes `body` and builds a JSON response.
pub fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Response<Bytes>, RouterError> {
    let json = serde_json::to_vec(body)
        .map_err(|e| RouterError::InternalError(format!("Failed to serialize response: {}", e)))?;
    build_response(status, json)
}

/// Helper to build empty HTTP response (for 204 No Content)
pub fn build_empty_response(status: u16) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .body(Bytes::new())
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}
