//! Response types and helpers for HTTP endpoints.

use serde::Serialize;

/// List endpoint envelope.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    /// Returned rows
    pub data: Vec<T>,
    /// Number of rows in `data` (not the table total)
    pub count: usize,
}

/// Helper to create a list response
pub fn list_response<T: Serialize>(data: Vec<T>) -> ListResponse<T> {
    let count = data.len();
    ListResponse { data, count }
}

/// Body of a delete response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// False when the record did not exist
    pub deleted: bool,
}

/// Error envelope shared by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,
    /// HTTP status code, repeated in the body
    pub status_code: u16,
    /// Request path
    pub path: String,
}

/// Helper to create error response
pub fn error_response(status_code: u16, error: impl Into<String>, path: &str) -> ErrorResponse {
    ErrorResponse {
        error: error.into(),
        status_code,
        path: path.to_string(),
    }
}
