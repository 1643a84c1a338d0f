//! Detection heuristics: tunable thresholds, signature matching, and the
//! candidate findings the anomaly checks emit.
//!
//! All thresholds live in [`DetectionConfig`] so deployments can tune them
//! through configuration instead of a redeploy, and tests can pin them.

use regex::RegexSet;
use serde::Serialize;

use crate::error::CoreError;
use crate::flag::{FlagPriority, FlagType};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// How many of the actor's most recent records the rate check fetches.
pub const DEFAULT_RATE_LOOKBACK_RECORDS: i64 = 100;

/// Trailing window for the rate check, in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: i64 = 60;

/// Requests inside the rate window above which the rate check fires.
pub const DEFAULT_RATE_MAX_REQUESTS: i64 = 30;

/// How many of the actor's most recent records the error-rate check fetches.
pub const DEFAULT_ERROR_LOOKBACK_RECORDS: i64 = 1000;

/// Trailing window for the error-rate check, in seconds.
pub const DEFAULT_ERROR_WINDOW_SECS: i64 = 3600;

/// Error ratio above which the error-rate check fires.
pub const DEFAULT_ERROR_RATE_THRESHOLD: f64 = 0.5;

/// Route prefixes monitored for first-touch access by an actor.
pub const DEFAULT_SENSITIVE_PATH_PREFIXES: &[&str] = &[
    "/api/v1/admin",
    "/api/v1/users",
    "/api/v1/api-keys",
    "/api/v1/config",
    "/api/v1/export",
];

/// Injection / XSS signature patterns matched against the serialized
/// query string and request body. Case-insensitive.
pub const DEFAULT_INJECTION_SIGNATURES: &[&str] = &[
    r"drop\s+table",
    r"union\s+select",
    r"insert\s+into",
    r"delete\s+from",
    r"or\s+1\s*=\s*1",
    r"'\s*or\s*'",
    r"<script",
    r"javascript:",
    r"onerror\s*=",
    r"\.\./\.\./",
    r";\s*rm\s+-",
    r"\beval\s*\(",
];

// ---------------------------------------------------------------------------
// Signature list
// ---------------------------------------------------------------------------

/// A compiled set of payload signatures.
///
/// Keeps the source pattern strings next to the compiled [`RegexSet`] so a
/// match can be reported by the pattern that produced it.
#[derive(Debug, Clone)]
pub struct SignatureList {
    patterns: Vec<String>,
    set: RegexSet,
}

impl SignatureList {
    /// Compile a signature list. Patterns are matched case-insensitively.
    pub fn new<I, S>(patterns: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}")))
            .map_err(|e| CoreError::Validation(format!("Invalid signature pattern: {e}")))?;
        Ok(Self { patterns, set })
    }

    /// Return the first signature that matches `haystack`, if any.
    pub fn first_match(&self, haystack: &str) -> Option<&str> {
        self.set
            .matches(haystack)
            .iter()
            .next()
            .map(|idx| self.patterns[idx].as_str())
    }

    /// The source pattern strings, in match-priority order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SignatureList {
    fn default() -> Self {
        // The built-in pattern set is a compile-time constant.
        Self::new(DEFAULT_INJECTION_SIGNATURES.iter().copied())
            .expect("built-in signature patterns are valid")
    }
}

// ---------------------------------------------------------------------------
// Detection configuration
// ---------------------------------------------------------------------------

/// Tunable thresholds and signature sets for the anomaly checks.
///
/// Lookbacks are capped record counts; the time windows are applied on top
/// of the capped fetch, which bounds per-event evaluation cost even for
/// very active actors.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub rate_lookback_records: i64,
    pub rate_window_secs: i64,
    pub rate_max_requests: i64,
    pub sensitive_path_prefixes: Vec<String>,
    pub signatures: SignatureList,
    pub error_lookback_records: i64,
    pub error_window_secs: i64,
    pub error_rate_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            rate_lookback_records: DEFAULT_RATE_LOOKBACK_RECORDS,
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            rate_max_requests: DEFAULT_RATE_MAX_REQUESTS,
            sensitive_path_prefixes: DEFAULT_SENSITIVE_PATH_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            signatures: SignatureList::default(),
            error_lookback_records: DEFAULT_ERROR_LOOKBACK_RECORDS,
            error_window_secs: DEFAULT_ERROR_WINDOW_SECS,
            error_rate_threshold: DEFAULT_ERROR_RATE_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    /// Whether `path` falls under a monitored sensitive prefix.
    pub fn is_sensitive_path(&self, path: &str) -> bool {
        self.sensitive_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Error ratio
// ---------------------------------------------------------------------------

/// Ratio of error outcomes to total outcomes. Zero when the sample is empty.
pub fn error_rate(error_count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    error_count as f64 / total as f64
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// A candidate anomaly signal emitted by one detector check, before it is
/// persisted as a flag.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub flag_type: FlagType,
    pub priority: FlagPriority,
    pub confidence: f64,
    pub message: String,
    pub details: serde_json::Value,
}

impl Finding {
    pub fn new(
        flag_type: FlagType,
        priority: FlagPriority,
        confidence: f64,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            flag_type,
            priority,
            confidence: crate::flag::clamp_score(confidence),
            message: message.into(),
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- SignatureList --------------------------------------------------------

    #[test]
    fn drop_table_matches_case_insensitively() {
        let sigs = SignatureList::default();
        assert_eq!(sigs.first_match("DROP TABLE users;"), Some(r"drop\s+table"));
        assert_eq!(sigs.first_match("drop   table users"), Some(r"drop\s+table"));
    }

    #[test]
    fn script_tag_matches() {
        let sigs = SignatureList::default();
        assert_eq!(sigs.first_match("q=<ScRiPt>alert(1)</script>"), Some("<script"));
    }

    #[test]
    fn clean_payload_does_not_match() {
        let sigs = SignatureList::default();
        assert_eq!(sigs.first_match("page=2&sort=created_at"), None);
        assert_eq!(sigs.first_match(r#"{"name":"quarterly report"}"#), None);
    }

    #[test]
    fn invalid_pattern_is_a_validation_error() {
        let err = SignatureList::new(["("]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn custom_patterns_keep_priority_order() {
        let sigs = SignatureList::new(["aaa", "bbb"]).unwrap();
        assert_eq!(sigs.first_match("xx bbb aaa"), Some("aaa"));
        assert_eq!(sigs.patterns().len(), 2);
    }

    // -- Sensitive paths ------------------------------------------------------

    #[test]
    fn admin_prefix_is_sensitive() {
        let config = DetectionConfig::default();
        assert!(config.is_sensitive_path("/api/v1/admin/users"));
        assert!(config.is_sensitive_path("/api/v1/api-keys"));
    }

    #[test]
    fn ordinary_paths_are_not_sensitive() {
        let config = DetectionConfig::default();
        assert!(!config.is_sensitive_path("/api/v1/videos/42"));
        assert!(!config.is_sensitive_path("/health"));
    }

    // -- Error ratio ----------------------------------------------------------

    #[test]
    fn error_rate_of_empty_sample_is_zero() {
        assert_eq!(error_rate(0, 0), 0.0);
    }

    #[test]
    fn error_rate_is_simple_ratio() {
        assert_eq!(error_rate(6, 10), 0.6);
        assert_eq!(error_rate(1, 2), 0.5);
    }

    // -- Findings -------------------------------------------------------------

    #[test]
    fn finding_clamps_confidence() {
        let f = Finding::new(
            FlagType::SystemAnomaly,
            FlagPriority::Medium,
            1.7,
            "msg",
            serde_json::json!({}),
        );
        assert_eq!(f.confidence, 1.0);
    }
}
