//! Activity record entity models and DTOs.
//!
//! Activity records are append-only: there is no update DTO and no store
//! operation that mutates a written record.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vigil_core::activity::ActivityStatus;
use vigil_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Activity record entity
// ---------------------------------------------------------------------------

/// One completed authenticated request. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: DbId,
    pub actor_id: DbId,
    pub session_id: String,
    pub action_type: String,
    pub target_id: Option<DbId>,
    pub ip_address: Option<String>,
    pub status: String,
    pub detail_json: serde_json::Value,
    pub created_at: Timestamp,
}

impl ActivityRecord {
    /// Parsed outcome status.
    ///
    /// Records are only ever written by this workspace, so unknown text is
    /// read as `Success` rather than surfaced as an error.
    pub fn outcome(&self) -> ActivityStatus {
        ActivityStatus::parse(&self.status).unwrap_or(ActivityStatus::Success)
    }

    /// Parsed structured detail payload.
    pub fn detail(&self) -> ActivityDetail {
        ActivityDetail::from_value(&self.detail_json)
    }
}

// ---------------------------------------------------------------------------
// Detail payload
// ---------------------------------------------------------------------------

/// Structured request metadata stored in `detail_json`.
///
/// `body` is a capped excerpt of the request body (the recorder skips
/// capture entirely for large or non-UTF-8 bodies). `extra` carries
/// route-supplied key/value pairs from the detail-extractor callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityDetail {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub latency_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ActivityDetail {
    /// Parse a stored `detail_json` value. Missing or malformed fields fall
    /// back to their defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for appending a new activity record.
///
/// `created_at` is stamped by the store at write time, which makes record
/// order store-write order rather than request-arrival order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateActivityRecord {
    pub actor_id: DbId,
    pub session_id: String,
    pub action_type: String,
    pub target_id: Option<DbId>,
    pub ip_address: Option<String>,
    pub status: String,
    pub detail_json: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Filter parameters for querying activity records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityQuery {
    pub actor_id: Option<DbId>,
    pub action_type: Option<String>,
    pub status: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for activity queries.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityPage {
    pub items: Vec<ActivityRecord>,
    pub total: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
