//! HTTP endpoint implementations.

pub mod audit_handlers;
pub mod crud_handlers;
pub mod request_utils;
pub mod response;
pub mod stats_handlers;
pub mod system_handlers;

pub use audit_handlers::list_audit_logs;
pub use crud_handlers::{
    create_record, delete_record, list_outline_sections, list_records, read_record, update_record,
};
pub use response::{error_response, list_response, DeleteResponse, ErrorResponse, ListResponse};
pub use stats_handlers::pipeline_stats;
pub use system_handlers::{health, version};
