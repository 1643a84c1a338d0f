//! Handlers for flag triage.
//!
//! The status model places no guard on the current state: any triage
//! operation is permitted from any state, and the investigation note log
//! keeps the history of re-triage.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;
use vigil_core::error::CoreError;
use vigil_core::flag::{self, FlagPriority, FlagStatus, FlagType};
use vigil_core::types::DbId;
use vigil_db::models::{CreateFlag, Flag, FlagChange, FlagPage, FlagQuery};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_timestamp_opt;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / query parameter types
// ---------------------------------------------------------------------------

/// Body for operator-created flags.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFlagRequest {
    #[validate(length(min = 1, max = 500))]
    pub message: String,
    /// Defaults to `medium`.
    pub priority: Option<String>,
    /// Actor the review concerns, if any.
    pub actor_id: Option<DbId>,
    /// Activity record that prompted the review, if any.
    pub activity_id: Option<DbId>,
    pub details: Option<serde_json::Value>,
}

/// Query parameters for flag queries.
#[derive(Debug, Deserialize)]
pub struct FlagQueryParams {
    pub flag_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub actor_id: Option<DbId>,
    pub assigned_to: Option<DbId>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assignee: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveRequest {
    #[validate(length(min = 1))]
    pub notes: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1))]
    pub note: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: "flag", id })
}

fn validated<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Apply a triage change, 404ing on unknown flags.
async fn apply_change(state: &AppState, id: DbId, change: FlagChange) -> AppResult<Flag> {
    state
        .store
        .update_flag(id, change)
        .await?
        .ok_or_else(|| not_found(id))
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

/// POST /admin/flags
///
/// Create an operator-authored `manual_review` flag. Admin only.
pub async fn create_flag(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<CreateFlagRequest>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;

    let priority = match input.priority.as_deref() {
        None => FlagPriority::Medium,
        Some(p) => FlagPriority::parse(p)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown priority '{p}'")))?,
    };

    let flag = state
        .store
        .create_flag(CreateFlag {
            flag_type: FlagType::ManualReview.as_str().to_string(),
            message: input.message,
            actor_id: input.actor_id,
            session_id: None,
            activity_id: input.activity_id,
            priority: priority.as_str().to_string(),
            details_json: input.details.unwrap_or_else(|| serde_json::json!({})),
            confidence_score: 1.0,
            anomaly_score: 1.0,
        })
        .await?;

    tracing::info!(flag_id = flag.id, created_by = admin.actor_id, "Manual review flag created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: flag })))
}

/// GET /admin/flags
///
/// Query flags with filters, free-text search, and pagination. Admin only.
pub async fn query_flags(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<FlagQueryParams>,
) -> AppResult<impl IntoResponse> {
    let query = FlagQuery {
        flag_type: params.flag_type,
        status: params.status,
        priority: params.priority,
        actor_id: params.actor_id,
        assigned_to: params.assigned_to,
        search: params.search,
        from: parse_timestamp_opt("from", &params.from)?,
        to: parse_timestamp_opt("to", &params.to)?,
        limit: params.limit,
        offset: params.offset,
    };

    let items = state.store.query_flags(&query).await?;
    let total = state.store.count_flags(&query).await?;

    Ok(Json(DataResponse {
        data: FlagPage { items, total },
    }))
}

/// GET /admin/flags/{id}
pub async fn get_flag(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let flag = state.store.find_flag(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: flag }))
}

// ---------------------------------------------------------------------------
// Triage transitions
// ---------------------------------------------------------------------------

/// POST /admin/flags/{id}/assign
///
/// Move the flag to `investigating` and set the assignee.
pub async fn assign_flag(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<AssignRequest>,
) -> AppResult<impl IntoResponse> {
    let change = FlagChange {
        status: Some(FlagStatus::Investigating.as_str().to_string()),
        assigned_to: Some(input.assignee),
        append_note: Some(flag::note_line(
            &admin.actor_id.to_string(),
            &format!("assigned to {}", input.assignee),
            Utc::now(),
        )),
        ..Default::default()
    };
    let flag = apply_change(&state, id, change).await?;
    Ok(Json(DataResponse { data: flag }))
}

/// POST /admin/flags/{id}/resolve
///
/// Move the flag to `resolved` and stamp the resolution metadata.
pub async fn resolve_flag(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;
    let change = FlagChange {
        status: Some(FlagStatus::Resolved.as_str().to_string()),
        resolved_by: Some(admin.actor_id),
        resolved_at: Some(Utc::now()),
        resolution_notes: Some(input.notes),
        ..Default::default()
    };
    let flag = apply_change(&state, id, change).await?;
    Ok(Json(DataResponse { data: flag }))
}

/// POST /admin/flags/{id}/escalate
///
/// Move the flag to `escalated` and append the escalation note.
pub async fn escalate_flag(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<NoteRequest>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;
    let change = FlagChange {
        status: Some(FlagStatus::Escalated.as_str().to_string()),
        append_note: Some(flag::note_line(
            &admin.actor_id.to_string(),
            &input.note,
            Utc::now(),
        )),
        ..Default::default()
    };
    let flag = apply_change(&state, id, change).await?;
    Ok(Json(DataResponse { data: flag }))
}

/// POST /admin/flags/{id}/false-positive
///
/// Move the flag to `false_positive`; stamps `resolved_at` and the
/// resolution notes but not `resolved_by`.
pub async fn mark_false_positive(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;
    let change = FlagChange {
        status: Some(FlagStatus::FalsePositive.as_str().to_string()),
        resolved_at: Some(Utc::now()),
        resolution_notes: Some(input.notes),
        ..Default::default()
    };
    let flag = apply_change(&state, id, change).await?;
    Ok(Json(DataResponse { data: flag }))
}

/// POST /admin/flags/{id}/notes
///
/// Append an investigation note. The status is never touched.
pub async fn add_note(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<NoteRequest>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;
    let change = FlagChange {
        append_note: Some(flag::note_line(
            &admin.actor_id.to_string(),
            &input.note,
            Utc::now(),
        )),
        ..Default::default()
    };
    let flag = apply_change(&state, id, change).await?;
    Ok(Json(DataResponse { data: flag }))
}
