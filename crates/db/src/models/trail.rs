//! Audit trail entity models and DTOs.
//!
//! Trails are immutable compliance artifacts: there is no update or delete
//! DTO, and corrections are new trails.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Audit trail entity
// ---------------------------------------------------------------------------

/// A frozen snapshot of activity records over a time window.
///
/// `source_log_ids` and `snapshot_json` are captured together at creation
/// time; their lengths match forever, regardless of later retention cleanup
/// in the activity store.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditTrail {
    pub id: DbId,
    pub created_by: DbId,
    pub name: String,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub filters_json: serde_json::Value,
    pub source_log_ids: Vec<DbId>,
    pub snapshot_json: serde_json::Value,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for creating a trail. The id list and snapshot are resolved by the
/// trail builder before this reaches the store.
#[derive(Debug, Clone)]
pub struct CreateAuditTrail {
    pub created_by: DbId,
    pub name: String,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub filters_json: serde_json::Value,
    pub source_log_ids: Vec<DbId>,
    pub snapshot_json: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Record filters
// ---------------------------------------------------------------------------

/// Optional record filters applied inside a trail's time window, both at
/// creation time and again at export time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrailFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TrailFilters {
    /// Parse the stored `filters_json` value. Malformed content reads as
    /// no filters.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }

    /// Whether a record passes every active filter.
    pub fn matches(&self, actor_id: DbId, action_type: &str, status: &str) -> bool {
        if let Some(want) = self.actor_id {
            if actor_id != want {
                return false;
            }
        }
        if let Some(ref want) = self.action_type {
            if action_type != want {
                return false;
            }
        }
        if let Some(ref want) = self.status {
            if status != want {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_match_everything() {
        let filters = TrailFilters::default();
        assert!(filters.matches(1, "flag_triage", "success"));
    }

    #[test]
    fn each_filter_narrows_the_match() {
        let filters = TrailFilters {
            actor_id: Some(7),
            action_type: Some("trail_create".into()),
            status: Some("failure".into()),
        };
        assert!(filters.matches(7, "trail_create", "failure"));
        assert!(!filters.matches(8, "trail_create", "failure"));
        assert!(!filters.matches(7, "flag_triage", "failure"));
        assert!(!filters.matches(7, "trail_create", "success"));
    }

    #[test]
    fn filters_round_trip_through_json() {
        let filters = TrailFilters {
            actor_id: Some(3),
            action_type: None,
            status: Some("warning".into()),
        };
        let parsed = TrailFilters::from_value(&filters.to_value());
        assert_eq!(parsed.actor_id, Some(3));
        assert!(parsed.action_type.is_none());
        assert_eq!(parsed.status.as_deref(), Some("warning"));
    }
}
