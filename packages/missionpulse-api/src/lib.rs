//! REST API server for the MissionPulse data layer.
//!
//! Provides HTTP endpoints for tracked-table CRUD, pipeline statistics and
//! audit log reads, plus request routing and middleware.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
