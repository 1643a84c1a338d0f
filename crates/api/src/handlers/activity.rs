//! Handlers for the activity record query surface.
//!
//! Read-only: records are written exclusively by the recording pipeline.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use vigil_core::activity::ActivityStatus;
use vigil_core::types::DbId;
use vigil_db::models::{ActivityPage, ActivityQuery};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_timestamp_opt;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for activity record queries.
#[derive(Debug, Deserialize)]
pub struct ActivityQueryParams {
    pub actor_id: Option<DbId>,
    pub action_type: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /admin/activity
///
/// Query activity records with filters and pagination. Admin only.
pub async fn query_activity(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ActivityQueryParams>,
) -> AppResult<impl IntoResponse> {
    if let Some(ref status) = params.status {
        if ActivityStatus::parse(status).is_none() {
            return Err(AppError::BadRequest(format!(
                "Unknown status '{status}'"
            )));
        }
    }

    let query = ActivityQuery {
        actor_id: params.actor_id,
        action_type: params.action_type,
        status: params.status,
        from: parse_timestamp_opt("from", &params.from)?,
        to: parse_timestamp_opt("to", &params.to)?,
        limit: params.limit,
        offset: params.offset,
    };

    let items = state.store.query(&query).await?;
    let total = state.store.count(&query).await?;

    Ok(Json(DataResponse {
        data: ActivityPage { items, total },
    }))
}
