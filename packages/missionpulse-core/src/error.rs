//! Error types for the mutation gateway and its collaborators.

use thiserror::Error;

/// Failures raised by a row store or audit sink.
///
/// Messages may carry backend detail; they are logged but never returned to
/// API callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected or failed the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend answered with something that is not a row
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The call did not complete within the configured bound
    #[error("Operation timeout")]
    Timeout,

    /// I/O error in a file-backed collaborator
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors surfaced by gateway and aggregator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Update carried no fields once nulls were stripped
    #[error("No fields to update")]
    EmptyChange,

    /// Change request violates the table schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Table is not tracked by the schema registry
    #[error("Table '{table}' is not tracked")]
    UnknownTable { table: String },

    /// Record does not exist
    #[error("Record '{id}' not found in table '{table}'")]
    NotFound { table: String, id: String },

    /// Row store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Shorthand for a schema validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
