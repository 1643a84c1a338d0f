//! HTTP handlers for the monitoring surface.

pub mod activity;
pub mod flags;
pub mod health;
pub mod trails;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

/// Parse a required ISO 8601 timestamp string.
pub(crate) fn parse_timestamp(field: &str, value: &str) -> AppResult<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|_| AppError::BadRequest(format!("Invalid date format for '{field}'")))
}

/// Parse an optional ISO 8601 timestamp string.
pub(crate) fn parse_timestamp_opt(
    field: &str,
    value: &Option<String>,
) -> AppResult<Option<DateTime<Utc>>> {
    match value {
        Some(v) => Ok(Some(parse_timestamp(field, v)?)),
        None => Ok(None),
    }
}
