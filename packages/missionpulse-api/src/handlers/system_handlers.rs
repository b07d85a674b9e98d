//! Unauthenticated service endpoints.

use hyper::{body::Bytes, Request, Response};
use serde::Serialize;

use crate::router::{AppState, RouterError};
use missionpulse_core::schema::AUDIT_LOG_TABLE;

use super::request_utils::json_response;

/// Service name reported by the system endpoints.
pub const SERVICE_NAME: &str = "missionpulse-api";

const CAPABILITIES: [&str; 4] = ["data_crud", "audit_logging", "pipeline_stats", "cors"];

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: &'static str,
    capabilities: Vec<&'static str>,
    data_tables: Vec<String>,
}

/// Liveness probe.
///
/// # Endpoint
/// `GET /api/health`
pub async fn health(
    _req: Request<Bytes>,
    _state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    json_response(
        200,
        &HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

/// Version, capabilities and tracked tables.
///
/// # Endpoint
/// `GET /api/version`
pub async fn version(
    _req: Request<Bytes>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let mut data_tables = state.schemas.table_names();
    data_tables.push(AUDIT_LOG_TABLE.to_string());
    json_response(
        200,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            capabilities: CAPABILITIES.to_vec(),
            data_tables,
        },
    )
}
