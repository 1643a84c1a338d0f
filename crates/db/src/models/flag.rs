//! Flag entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Flag entity
// ---------------------------------------------------------------------------

/// A triaged anomaly finding.
///
/// `status`, `priority`, and `flag_type` hold the text forms of the closed
/// vocabularies in `vigil_core::flag`; `investigation_notes` is an
/// append-only log, one `[timestamp] author: note` entry per line.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Flag {
    pub id: DbId,
    pub flag_type: String,
    pub message: String,
    pub actor_id: Option<DbId>,
    pub session_id: Option<String>,
    pub activity_id: Option<DbId>,
    pub status: String,
    pub priority: String,
    pub details_json: serde_json::Value,
    pub confidence_score: f64,
    pub anomaly_score: f64,
    pub assigned_to: Option<DbId>,
    pub investigation_notes: Option<String>,
    pub resolved_by: Option<DbId>,
    pub resolved_at: Option<Timestamp>,
    pub resolution_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for creating a flag. The store always writes the initial status as
/// `new`; callers cannot choose it.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFlag {
    pub flag_type: String,
    pub message: String,
    pub actor_id: Option<DbId>,
    pub session_id: Option<String>,
    pub activity_id: Option<DbId>,
    pub priority: String,
    pub details_json: serde_json::Value,
    pub confidence_score: f64,
    pub anomaly_score: f64,
}

// ---------------------------------------------------------------------------
// Change DTO
// ---------------------------------------------------------------------------

/// Partial update applied by a triage operation.
///
/// `append_note` adds a line to the investigation log without replacing it;
/// every applied change stamps `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct FlagChange {
    pub status: Option<String>,
    pub assigned_to: Option<DbId>,
    pub append_note: Option<String>,
    pub resolved_by: Option<DbId>,
    pub resolved_at: Option<Timestamp>,
    pub resolution_notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Filter parameters for querying flags.
///
/// `search` is a case-insensitive substring match over the message and the
/// investigation note log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagQuery {
    pub flag_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub actor_id: Option<DbId>,
    pub assigned_to: Option<DbId>,
    pub search: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for flag queries.
#[derive(Debug, Clone, Serialize)]
pub struct FlagPage {
    pub items: Vec<Flag>,
    pub total: i64,
}
