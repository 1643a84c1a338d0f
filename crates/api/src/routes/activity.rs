//! Route definitions for activity record queries.

use axum::routing::get;
use axum::{middleware as axum_middleware, Router};
use vigil_core::activity::action_types;

use crate::handlers::activity;
use crate::middleware::activity as recorder;
use crate::state::AppState;

/// Activity routes mounted at `/admin/activity`.
///
/// ```text
/// GET  /    -> query_activity
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(activity::query_activity))
        .route_layer(axum_middleware::from_fn(recorder::record(
            action_types::ACTIVITY_QUERY,
        )))
}
