//! Flag vocabulary and lifecycle helpers.
//!
//! A flag is the triaged form of a detector finding (or an operator-created
//! review item). The status model deliberately places no guard on the
//! current state before a transition: operators may re-open, re-assign, or
//! re-resolve at will, and the investigation note log keeps the history.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Closed vocabularies
// ---------------------------------------------------------------------------

/// The kind of suspected anomaly a flag describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    RateLimitExceeded,
    AccessViolation,
    SecurityViolation,
    SystemAnomaly,
    ManualReview,
}

impl FlagType {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagType::RateLimitExceeded => "rate_limit_exceeded",
            FlagType::AccessViolation => "access_violation",
            FlagType::SecurityViolation => "security_violation",
            FlagType::SystemAnomaly => "system_anomaly",
            FlagType::ManualReview => "manual_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limit_exceeded" => Some(FlagType::RateLimitExceeded),
            "access_violation" => Some(FlagType::AccessViolation),
            "security_violation" => Some(FlagType::SecurityViolation),
            "system_anomaly" => Some(FlagType::SystemAnomaly),
            "manual_review" => Some(FlagType::ManualReview),
            _ => None,
        }
    }
}

/// Triage state of a flag. Every flag starts in `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    New,
    Investigating,
    Resolved,
    FalsePositive,
    Escalated,
}

impl FlagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagStatus::New => "new",
            FlagStatus::Investigating => "investigating",
            FlagStatus::Resolved => "resolved",
            FlagStatus::FalsePositive => "false_positive",
            FlagStatus::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(FlagStatus::New),
            "investigating" => Some(FlagStatus::Investigating),
            "resolved" => Some(FlagStatus::Resolved),
            "false_positive" => Some(FlagStatus::FalsePositive),
            "escalated" => Some(FlagStatus::Escalated),
            _ => None,
        }
    }
}

/// Operator-facing urgency of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl FlagPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagPriority::Low => "low",
            FlagPriority::Medium => "medium",
            FlagPriority::High => "high",
            FlagPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(FlagPriority::Low),
            "medium" => Some(FlagPriority::Medium),
            "high" => Some(FlagPriority::High),
            "critical" => Some(FlagPriority::Critical),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Score handling
// ---------------------------------------------------------------------------

/// Clamp a confidence or anomaly score into `0.0..=1.0`.
///
/// NaN collapses to 0.0 so a buggy producer cannot poison sort order.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Investigation note log
// ---------------------------------------------------------------------------

/// Render one line of the append-only investigation note log.
///
/// Format: `[RFC3339 timestamp] author: note`. Newlines inside the note are
/// flattened to spaces so the log stays one line per entry.
pub fn note_line(author: &str, note: &str, at: Timestamp) -> String {
    let flattened = note.replace(['\r', '\n'], " ");
    format!("[{}] {}: {}", at.to_rfc3339(), author, flattened.trim())
}

/// Append a line to an existing note log, keeping one entry per line.
pub fn append_note(existing: Option<&str>, line: &str) -> String {
    match existing {
        Some(log) if !log.is_empty() => format!("{log}\n{line}"),
        _ => line.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
