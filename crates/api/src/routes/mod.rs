pub mod health;
pub mod job;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs          list, create
/// /jobs/{id}     get, resubmit
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", job::router())
}
