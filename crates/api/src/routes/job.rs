//! Route definitions for jobs.

use axum::routing::get;
use axum::Router;

use crate::handlers::job;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET  /       -> list
/// POST /       -> create
/// GET  /{id}   -> get_by_id
/// PUT  /{id}   -> resubmit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(job::list).post(job::create))
        .route("/{id}", get(job::get_by_id).put(job::resubmit))
}
