//! Route tree for the monitoring surface.

pub mod activity;
pub mod flags;
pub mod health;
pub mod trails;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /admin/activity                       GET  query activity records
///
/// /admin/flags                          GET  query, POST create (manual review)
/// /admin/flags/{id}                     GET  fetch one
/// /admin/flags/{id}/assign              POST -> investigating
/// /admin/flags/{id}/resolve             POST -> resolved
/// /admin/flags/{id}/escalate            POST -> escalated
/// /admin/flags/{id}/false-positive      POST -> false_positive
/// /admin/flags/{id}/notes               POST append investigation note
///
/// /admin/audit-trails                   GET  list, POST create
/// /admin/audit-trails/{id}              GET  fetch one
/// /admin/audit-trails/{id}/export       GET  ?format=json|csv
/// ```
///
/// All routes require the `admin` role (enforced by handler extractors) and
/// carry the activity recorder as a route layer.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/admin/activity", activity::router())
        .nest("/admin/flags", flags::router())
        .nest("/admin/audit-trails", trails::router())
}
