//! Derived statistics handlers.

use hyper::{body::Bytes, Request, Response};

use crate::router::{AppState, RouterError};

use super::request_utils::json_response;

/// Opportunity pipeline statistics.
///
/// # Endpoint
/// `GET /api/data/pipeline/stats`
///
/// # Response
/// ```json
/// {
///   "total_opportunities": 2,
///   "total_pipeline_value": 1250000.0,
///   "by_phase": {"negotiate": 1, "qualify": 1},
///   "avg_pwin": 20.0,
///   "window": 200
/// }
/// ```
///
/// # Notes
/// - Computed over at most `window` rows (`stats_window` in the service
///   config); on larger tables the figures cover that window only
pub async fn pipeline_stats(
    req: Request<Bytes>,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    state.authenticate(&req).await?;
    let stats = state
        .aggregator
        .pipeline_stats(state.config.stats_window)
        .await?;
    json_response(200, &stats)
}
