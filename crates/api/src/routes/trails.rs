//! Route definitions for audit trails.

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use vigil_core::activity::action_types;

use crate::handlers::trails;
use crate::middleware::activity::{self as recorder, RecordOptions};
use crate::state::AppState;

/// Audit trail routes mounted at `/admin/audit-trails`.
///
/// ```text
/// GET  /               -> list_trails
/// POST /               -> create_trail
/// GET  /{id}           -> get_trail
/// GET  /{id}/export    -> export_trail (?format=json|csv)
/// ```
pub fn router() -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(trails::list_trails))
        .route("/{id}", get(trails::get_trail))
        .route_layer(axum_middleware::from_fn(recorder::record(
            action_types::TRAIL_QUERY,
        )));

    let create = Router::new()
        .route("/", post(trails::create_trail))
        .route_layer(axum_middleware::from_fn(recorder::record(
            action_types::TRAIL_CREATE,
        )));

    let export = Router::new()
        .route("/{id}/export", get(trails::export_trail))
        .route_layer(axum_middleware::from_fn(recorder::record_with(
            action_types::TRAIL_EXPORT,
            RecordOptions {
                target: Some(recorder::target_from_path),
                ..Default::default()
            },
        )));

    reads.merge(create).merge(export)
}
