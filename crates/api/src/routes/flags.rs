//! Route definitions for flag triage.

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use vigil_core::activity::action_types;

use crate::handlers::flags;
use crate::middleware::activity::{self as recorder, RecordOptions};
use crate::state::AppState;

/// Flag routes mounted at `/admin/flags`.
///
/// ```text
/// GET  /                       -> query_flags
/// POST /                       -> create_flag
/// GET  /{id}                   -> get_flag
/// POST /{id}/assign            -> assign_flag
/// POST /{id}/resolve           -> resolve_flag
/// POST /{id}/escalate          -> escalate_flag
/// POST /{id}/false-positive    -> mark_false_positive
/// POST /{id}/notes             -> add_note
/// ```
///
/// Sub-routers exist so each group records under its own action type.
pub fn router() -> Router<AppState> {
    let reads = Router::new()
        .route("/", get(flags::query_flags))
        .route("/{id}", get(flags::get_flag))
        .route_layer(axum_middleware::from_fn(recorder::record(
            action_types::FLAG_QUERY,
        )));

    let create = Router::new()
        .route("/", post(flags::create_flag))
        .route_layer(axum_middleware::from_fn(recorder::record(
            action_types::FLAG_CREATE,
        )));

    let triage = Router::new()
        .route("/{id}/assign", post(flags::assign_flag))
        .route("/{id}/resolve", post(flags::resolve_flag))
        .route("/{id}/escalate", post(flags::escalate_flag))
        .route("/{id}/false-positive", post(flags::mark_false_positive))
        .route("/{id}/notes", post(flags::add_note))
        .route_layer(axum_middleware::from_fn(recorder::record_with(
            action_types::FLAG_TRIAGE,
            RecordOptions {
                target: Some(recorder::target_from_path),
                ..Default::default()
            },
        )));

    reads.merge(create).merge(triage)
}
