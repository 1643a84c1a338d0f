//! Health check endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use vigil_db::models::ActivityQuery;

use crate::state::AppState;

/// GET /health
///
/// Reports process liveness and whether the record store answers queries.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.store.count(&ActivityQuery::default()).await.is_ok();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store_healthy": store_healthy,
    }))
}
