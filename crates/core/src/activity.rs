//! Activity record vocabulary: action types and request outcome status.
//!
//! This module lives in `core` (zero internal deps) so it can be used by the
//! store backends, the recording pipeline, and the HTTP layer alike.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Action type constants
// ---------------------------------------------------------------------------

/// Known action types for activity records.
///
/// Routes outside this workspace (user CRUD, ingest, search proxy) supply
/// their own action types; these cover the monitoring surface itself.
pub mod action_types {
    pub const ACTIVITY_QUERY: &str = "activity_query";
    pub const FLAG_CREATE: &str = "flag_create";
    pub const FLAG_QUERY: &str = "flag_query";
    pub const FLAG_TRIAGE: &str = "flag_triage";
    pub const TRAIL_CREATE: &str = "trail_create";
    pub const TRAIL_QUERY: &str = "trail_query";
    pub const TRAIL_EXPORT: &str = "trail_export";
    pub const SYSTEM: &str = "system";
}

// ---------------------------------------------------------------------------
// Outcome status
// ---------------------------------------------------------------------------

/// Outcome of a recorded request, derived from the HTTP response status.
///
/// Stored as text in the record (`as_str`). `Warning` covers client errors
/// (4xx), `Failure` covers server errors (5xx); everything else is `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Failure,
    Warning,
}

impl ActivityStatus {
    /// Derive the outcome from an HTTP response status code.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            500..=599 => ActivityStatus::Failure,
            400..=499 => ActivityStatus::Warning,
            _ => ActivityStatus::Success,
        }
    }

    /// The stored text form.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Failure => "failure",
            ActivityStatus::Warning => "warning",
        }
    }

    /// Parse the stored text form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ActivityStatus::Success),
            "failure" => Some(ActivityStatus::Failure),
            "warning" => Some(ActivityStatus::Warning),
            _ => None,
        }
    }

    /// Whether this outcome counts as an error for detection purposes.
    ///
    /// Both 4xx warnings and 5xx failures count; repeated client errors are
    /// exactly what the error-rate heuristic is looking for.
    pub fn is_error(self) -> bool {
        !matches!(self, ActivityStatus::Success)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_is_success() {
        assert_eq!(ActivityStatus::from_status_code(200), ActivityStatus::Success);
        assert_eq!(ActivityStatus::from_status_code(201), ActivityStatus::Success);
        assert_eq!(ActivityStatus::from_status_code(302), ActivityStatus::Success);
    }

    #[test]
    fn client_error_is_warning() {
        assert_eq!(ActivityStatus::from_status_code(400), ActivityStatus::Warning);
        assert_eq!(ActivityStatus::from_status_code(404), ActivityStatus::Warning);
    }

    #[test]
    fn server_error_is_failure() {
        assert_eq!(ActivityStatus::from_status_code(500), ActivityStatus::Failure);
        assert_eq!(ActivityStatus::from_status_code(503), ActivityStatus::Failure);
    }

    #[test]
    fn round_trips_through_text() {
        for status in [
            ActivityStatus::Success,
            ActivityStatus::Failure,
            ActivityStatus::Warning,
        ] {
            assert_eq!(ActivityStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_text_parses_to_none() {
        assert_eq!(ActivityStatus::parse("unknown"), None);
    }

    #[test]
    fn only_success_is_not_an_error() {
        assert!(!ActivityStatus::Success.is_error());
        assert!(ActivityStatus::Failure.is_error());
        assert!(ActivityStatus::Warning.is_error());
    }
}
