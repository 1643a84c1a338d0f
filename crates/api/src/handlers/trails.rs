//! Handlers for audit trail creation and export.
//!
//! A trail freezes the records matching a window at creation time. Export
//! re-resolves the window against the live store instead of replaying the
//! frozen id list, so records written late by the detached recorder are
//! included; the snapshot stays untouched either way.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;
use vigil_core::error::CoreError;
use vigil_core::export::{csv_line, ACTIVITY_CSV_HEADER};
use vigil_core::types::DbId;
use vigil_db::models::{ActivityRecord, AuditTrail, CreateAuditTrail, TrailFilters};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_timestamp;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / query parameter types
// ---------------------------------------------------------------------------

/// Body for trail creation.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTrailRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Window start, ISO 8601.
    pub window_start: String,
    /// Window end, ISO 8601.
    pub window_end: String,
    #[serde(default)]
    pub filters: TrailFilters,
}

/// Query parameters for trail listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for trail export.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /admin/audit-trails
///
/// Resolve the matching records at call time and freeze them into a new
/// trail. Fails with `NO_MATCHING_RECORDS` when the window is empty.
pub async fn create_trail(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<CreateTrailRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let window_start = parse_timestamp("window_start", &input.window_start)?;
    let window_end = parse_timestamp("window_end", &input.window_end)?;
    if window_end <= window_start {
        return Err(AppError::Core(CoreError::Validation(
            "window_end must be after window_start".into(),
        )));
    }

    let records = state
        .store
        .export_range(window_start, window_end, &input.filters)
        .await?;
    if records.is_empty() {
        return Err(AppError::Core(CoreError::NoMatchingRecords));
    }

    let source_log_ids: Vec<DbId> = records.iter().map(|r| r.id).collect();
    let snapshot_json = serde_json::to_value(&records)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize snapshot: {e}")))?;

    let trail = state
        .store
        .create_trail(CreateAuditTrail {
            created_by: admin.actor_id,
            name: input.name,
            window_start,
            window_end,
            filters_json: input.filters.to_value(),
            source_log_ids,
            snapshot_json,
        })
        .await?;

    tracing::info!(
        trail_id = trail.id,
        created_by = admin.actor_id,
        records = trail.source_log_ids.len(),
        "Audit trail created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: trail })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /admin/audit-trails
pub async fn list_trails(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let items = state
        .store
        .list_trails(params.limit.unwrap_or(50), params.offset.unwrap_or(0))
        .await?;
    let total = state.store.count_trails().await?;

    Ok(Json(DataResponse {
        data: json!({ "items": items, "total": total }),
    }))
}

/// GET /admin/audit-trails/{id}
pub async fn get_trail(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let trail = find_trail(&state, id).await?;
    Ok(Json(DataResponse { data: trail }))
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// GET /admin/audit-trails/{id}/export?format=json|csv
///
/// Re-resolves the trail's window and filters against the live store and
/// renders the result in the requested format.
pub async fn export_trail(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
    Query(params): Query<ExportParams>,
) -> AppResult<Response> {
    let trail = find_trail(&state, id).await?;
    let filters = TrailFilters::from_value(&trail.filters_json);
    let records = state
        .store
        .export_range(trail.window_start, trail.window_end, &filters)
        .await?;

    match params.format.as_deref().unwrap_or("json") {
        "csv" => Ok(csv_response(&trail, &records)),
        "json" => Ok(Json(DataResponse {
            data: json!({
                "trail_id": trail.id,
                "name": trail.name,
                "exported_at": Utc::now().to_rfc3339(),
                "window_start": trail.window_start,
                "window_end": trail.window_end,
                "filters": trail.filters_json,
                "record_count": records.len(),
                "records": records,
            }),
        })
        .into_response()),
        other => Err(AppError::Core(CoreError::Validation(format!(
            "Unknown export format '{other}' (expected 'json' or 'csv')"
        )))),
    }
}

async fn find_trail(state: &AppState, id: DbId) -> AppResult<AuditTrail> {
    state
        .store
        .find_trail(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "audit trail",
            id,
        }))
}

/// Render the tabular export: one header line, then one fully-quoted row
/// per record with the detail payload JSON-encoded.
fn csv_response(trail: &AuditTrail, records: &[ActivityRecord]) -> Response {
    let mut output = String::from(ACTIVITY_CSV_HEADER);
    output.push('\n');
    for record in records {
        let fields = [
            record.id.to_string(),
            record.created_at.to_rfc3339(),
            record.actor_id.to_string(),
            record.session_id.clone(),
            record.action_type.clone(),
            record.target_id.map_or(String::new(), |id| id.to_string()),
            record.ip_address.clone().unwrap_or_default(),
            record.status.clone(),
            record.detail_json.to_string(),
        ];
        output.push_str(&csv_line(&fields));
        output.push('\n');
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/csv")
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"audit-trail-{}.csv\"", trail.id),
        )
        .body(axum::body::Body::from(output))
        .unwrap()
        .into_response()
}
