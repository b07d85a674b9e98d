//! Core of the MissionPulse data API.
//!
//! Provides the audit-logged mutation gateway, the windowed aggregator,
//! tracked table schemas, and the row store / audit sink / authenticator
//! collaborators they are composed from.

pub mod aggregate;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod record;
pub mod schema;
pub mod store;

pub use error::{CoreError, StoreError};
pub use record::{ChangeRequest, Fields, Record, RecordId};
