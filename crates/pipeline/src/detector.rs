//! Anomaly detector: four independent heuristic checks per recorded event.
//!
//! The checks run concurrently and are joined all-settled: a slow or failing
//! check never blocks or suppresses its siblings. Each check fetches a
//! bounded slice of history (capped record count, then time filter), so
//! per-event cost stays bounded even for very active actors.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use vigil_core::detection::{error_rate, DetectionConfig, Finding};
use vigil_core::flag::{FlagPriority, FlagType};
use vigil_db::models::{ActivityRecord, CreateFlag, Flag};
use vigil_db::store::{SharedStore, StoreError};
use vigil_events::{MonitorBus, MonitorEvent, MonitorEventKind};

// ---------------------------------------------------------------------------
// Confidence levels
// ---------------------------------------------------------------------------

const RATE_CONFIDENCE: f64 = 0.9;
const ACCESS_CONFIDENCE: f64 = 0.7;
const PAYLOAD_CONFIDENCE: f64 = 0.8;
const ERROR_RATE_CONFIDENCE: f64 = 0.6;

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Evaluates recorded events against the heuristic checks and persists
/// qualifying findings as flags.
pub struct AnomalyDetector {
    store: SharedStore,
    config: Arc<DetectionConfig>,
    monitor: MonitorBus,
}

impl AnomalyDetector {
    pub fn new(store: SharedStore, config: Arc<DetectionConfig>, monitor: MonitorBus) -> Self {
        Self {
            store,
            config,
            monitor,
        }
    }

    /// Run all checks against one recorded event and persist the findings.
    ///
    /// Returns the flags that were created. Check failures and flag-write
    /// failures are reported on the monitor bus; they never propagate.
    pub async fn evaluate(&self, record: &ActivityRecord) -> Vec<Flag> {
        let (rate, access, payload, errors) = tokio::join!(
            self.check_rate(record),
            self.check_access_pattern(record),
            self.check_payload(record),
            self.check_error_rate(record),
        );

        let outcomes = [
            ("rate", rate),
            ("access_pattern", access),
            ("suspicious_payload", payload),
            ("error_rate", errors),
        ];

        let mut created = Vec::new();
        for (check, outcome) in outcomes {
            match outcome {
                Ok(Some(finding)) => {
                    if let Some(flag) = self.persist_finding(check, finding, record).await {
                        created.push(flag);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        check,
                        error = %e,
                        activity_id = record.id,
                        "Detector check failed"
                    );
                    self.monitor.publish(
                        MonitorEvent::new(
                            MonitorEventKind::DetectorCheckFailed,
                            format!("Detector check '{check}' failed: {e}"),
                        )
                        .with_actor(record.actor_id)
                        .with_context(json!({ "check": check, "activity_id": record.id })),
                    );
                }
            }
        }
        created
    }

    // -----------------------------------------------------------------------
    // Rate anomaly
    // -----------------------------------------------------------------------

    /// Fires when the actor's request count inside the trailing window
    /// exceeds the configured limit. The triggering record is already
    /// persisted, so it is part of the count.
    async fn check_rate(&self, record: &ActivityRecord) -> Result<Option<Finding>, StoreError> {
        let recent = self
            .store
            .recent_for_actor(record.actor_id, self.config.rate_lookback_records)
            .await?;

        let window_start = record.created_at - Duration::seconds(self.config.rate_window_secs);
        let count = recent
            .iter()
            .filter(|r| r.created_at >= window_start)
            .count() as i64;

        if count <= self.config.rate_max_requests {
            return Ok(None);
        }

        Ok(Some(Finding::new(
            FlagType::RateLimitExceeded,
            FlagPriority::High,
            RATE_CONFIDENCE,
            format!(
                "Actor {} issued {} requests in the last {}s (limit {})",
                record.actor_id, count, self.config.rate_window_secs, self.config.rate_max_requests
            ),
            json!({
                "request_count": count,
                "window_secs": self.config.rate_window_secs,
                "max_requests": self.config.rate_max_requests,
            }),
        )))
    }

    // -----------------------------------------------------------------------
    // Access-pattern anomaly
    // -----------------------------------------------------------------------

    /// Fires on the actor's first-ever request to an exact path under a
    /// sensitive prefix. Any prior record of the same path (other than the
    /// triggering record itself) suppresses it.
    async fn check_access_pattern(
        &self,
        record: &ActivityRecord,
    ) -> Result<Option<Finding>, StoreError> {
        let detail = record.detail();
        if !self.config.is_sensitive_path(&detail.path) {
            return Ok(None);
        }

        let prior = self
            .store
            .count_actor_path(record.actor_id, &detail.path, record.id)
            .await?;
        if prior > 0 {
            return Ok(None);
        }

        Ok(Some(Finding::new(
            FlagType::AccessViolation,
            FlagPriority::Medium,
            ACCESS_CONFIDENCE,
            format!(
                "First access to sensitive path {} by actor {}",
                detail.path, record.actor_id
            ),
            json!({ "path": detail.path }),
        )))
    }

    // -----------------------------------------------------------------------
    // Suspicious-payload anomaly
    // -----------------------------------------------------------------------

    /// Matches the serialized query string and body excerpt against the
    /// configured injection/XSS signature list.
    async fn check_payload(&self, record: &ActivityRecord) -> Result<Option<Finding>, StoreError> {
        let detail = record.detail();
        let mut haystack = String::new();
        if let Some(ref query) = detail.query {
            haystack.push_str(query);
        }
        if let Some(ref body) = detail.body {
            haystack.push('\n');
            haystack.push_str(body);
        }
        if haystack.is_empty() {
            return Ok(None);
        }

        // Query strings arrive percent-encoded; match against the decoded
        // form so `DROP%20TABLE` does not slip past `drop\s+table`.
        let normalized = urlencoding::decode(&haystack.replace('+', " "))
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| haystack.clone());

        let Some(pattern) = self.config.signatures.first_match(&normalized) else {
            return Ok(None);
        };

        Ok(Some(Finding::new(
            FlagType::SecurityViolation,
            FlagPriority::High,
            PAYLOAD_CONFIDENCE,
            format!(
                "Suspicious payload on {} {} matched signature",
                detail.method, detail.path
            ),
            json!({ "pattern": pattern, "path": detail.path }),
        )))
    }

    // -----------------------------------------------------------------------
    // Error-rate anomaly
    // -----------------------------------------------------------------------

    /// Only evaluated when the triggering record itself is an error. The
    /// sample is the actor's recent records inside the trailing window; the
    /// triggering record is included in both numerator and denominator.
    async fn check_error_rate(
        &self,
        record: &ActivityRecord,
    ) -> Result<Option<Finding>, StoreError> {
        if !record.outcome().is_error() {
            return Ok(None);
        }

        let recent = self
            .store
            .recent_for_actor(record.actor_id, self.config.error_lookback_records)
            .await?;

        let window_start = record.created_at - Duration::seconds(self.config.error_window_secs);
        let mut total = 0usize;
        let mut errors = 0usize;
        for r in recent.iter().filter(|r| r.created_at >= window_start) {
            total += 1;
            if r.outcome().is_error() {
                errors += 1;
            }
        }

        if total == 0 {
            return Ok(None);
        }
        let rate = error_rate(errors, total);
        if rate <= self.config.error_rate_threshold {
            return Ok(None);
        }

        Ok(Some(Finding::new(
            FlagType::SystemAnomaly,
            FlagPriority::Medium,
            ERROR_RATE_CONFIDENCE,
            format!(
                "Actor {} error rate {:.2} over {} requests in the last {}s",
                record.actor_id, rate, total, self.config.error_window_secs
            ),
            json!({
                "error_rate": rate,
                "failure_count": errors,
                "sample_count": total,
            }),
        )))
    }

    // -----------------------------------------------------------------------
    // Finding persistence
    // -----------------------------------------------------------------------

    /// Persist a finding as a flag, enriched with the triggering request's
    /// context. Returns `None` (and reports) when the write fails.
    async fn persist_finding(
        &self,
        check: &str,
        finding: Finding,
        record: &ActivityRecord,
    ) -> Option<Flag> {
        let detail = record.detail();
        let mut details = finding.details;
        if let serde_json::Value::Object(ref mut map) = details {
            map.insert("check".into(), json!(check));
            map.insert("ip_address".into(), json!(record.ip_address));
            map.insert("user_agent".into(), json!(detail.user_agent));
            map.insert("method".into(), json!(detail.method));
            map.insert("request_path".into(), json!(detail.path));
            map.insert("detected_at".into(), json!(chrono::Utc::now().to_rfc3339()));
        }

        let input = CreateFlag {
            flag_type: finding.flag_type.as_str().to_string(),
            message: finding.message,
            actor_id: Some(record.actor_id),
            session_id: Some(record.session_id.clone()),
            activity_id: Some(record.id),
            priority: finding.priority.as_str().to_string(),
            details_json: details,
            confidence_score: finding.confidence,
            anomaly_score: finding.confidence,
        };

        match self.store.create_flag(input).await {
            Ok(flag) => {
                tracing::info!(
                    flag_id = flag.id,
                    flag_type = %flag.flag_type,
                    activity_id = record.id,
                    "Anomaly flag created"
                );
                self.monitor.publish(
                    MonitorEvent::new(
                        MonitorEventKind::FlagCreated,
                        format!("Flag {} created by check '{check}'", flag.id),
                    )
                    .with_actor(record.actor_id)
                    .with_context(json!({
                        "flag_id": flag.id,
                        "flag_type": flag.flag_type,
                        "check": check,
                    })),
                );
                Some(flag)
            }
            Err(e) => {
                tracing::error!(check, error = %e, "Failed to persist anomaly flag");
                self.monitor.publish(
                    MonitorEvent::new(
                        MonitorEventKind::FlagWriteFailed,
                        format!("Failed to persist flag from check '{check}': {e}"),
                    )
                    .with_actor(record.actor_id),
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use vigil_core::types::{DbId, Timestamp};
    use vigil_db::models::{
        ActivityDetail, ActivityQuery, AuditTrail, CreateActivityRecord, CreateAuditTrail,
        FlagChange, FlagQuery, TrailFilters,
    };
    use vigil_db::store::memory::MemoryStore;
    use vigil_db::store::{ActivityStore, FlagStore, TrailStore};

    fn detector_for(store: SharedStore) -> AnomalyDetector {
        AnomalyDetector::new(store, Arc::new(DetectionConfig::default()), MonitorBus::default())
    }

    fn request(actor_id: DbId, path: &str, status: &str) -> CreateActivityRecord {
        CreateActivityRecord {
            actor_id,
            session_id: "session-1".into(),
            action_type: "activity_query".into(),
            target_id: None,
            ip_address: Some("192.0.2.10".into()),
            status: status.into(),
            detail_json: ActivityDetail {
                method: "GET".into(),
                path: path.into(),
                user_agent: Some("test-agent".into()),
                ..Default::default()
            }
            .to_value(),
        }
    }

    fn request_with_query(actor_id: DbId, path: &str, query: &str) -> CreateActivityRecord {
        let mut input = request(actor_id, path, "success");
        let mut detail = ActivityDetail::from_value(&input.detail_json);
        detail.query = Some(query.into());
        input.detail_json = detail.to_value();
        input
    }

    // -- rate anomaly ---------------------------------------------------------

    #[tokio::test]
    async fn thirty_one_requests_in_window_fire_rate_flag() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let mut last = None;
        for _ in 0..31 {
            last = Some(store.append(request(1, "/api/v1/videos", "success")).await.unwrap());
        }
        let flags = detector.evaluate(&last.unwrap()).await;

        let rate_flag = flags
            .iter()
            .find(|f| f.flag_type == "rate_limit_exceeded")
            .expect("rate flag should fire");
        assert_eq!(rate_flag.priority, "high");
        assert!(rate_flag.details_json["request_count"].as_i64().unwrap() >= 31);
        assert_eq!(rate_flag.status, "new");
    }

    #[tokio::test]
    async fn twenty_nine_requests_do_not_fire_rate_flag() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let mut last = None;
        for _ in 0..29 {
            last = Some(store.append(request(1, "/api/v1/videos", "success")).await.unwrap());
        }
        let flags = detector.evaluate(&last.unwrap()).await;
        assert!(flags.iter().all(|f| f.flag_type != "rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn requests_outside_the_window_do_not_count() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        // 20 stale requests outside the 60s window plus 11 fresh ones.
        let stale = Utc::now() - Duration::seconds(300);
        for _ in 0..20 {
            store
                .append_backdated(request(1, "/api/v1/videos", "success"), stale)
                .await;
        }
        let mut last = None;
        for _ in 0..11 {
            last = Some(store.append(request(1, "/api/v1/videos", "success")).await.unwrap());
        }

        let flags = detector.evaluate(&last.unwrap()).await;
        assert!(flags.iter().all(|f| f.flag_type != "rate_limit_exceeded"));
    }

    // -- access-pattern anomaly -----------------------------------------------

    #[tokio::test]
    async fn first_touch_of_sensitive_path_fires_access_flag() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let record = store
            .append(request(1, "/api/v1/admin/users", "success"))
            .await
            .unwrap();
        let flags = detector.evaluate(&record).await;

        let access = flags
            .iter()
            .find(|f| f.flag_type == "access_violation")
            .expect("access flag should fire");
        assert_eq!(access.priority, "medium");
        assert_eq!(access.details_json["path"], "/api/v1/admin/users");
        assert_eq!(access.actor_id, Some(1));
        assert_eq!(access.activity_id, Some(record.id));
    }

    #[tokio::test]
    async fn second_touch_of_same_path_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let first = store
            .append(request(1, "/api/v1/admin/users", "success"))
            .await
            .unwrap();
        detector.evaluate(&first).await;

        let second = store
            .append(request(1, "/api/v1/admin/users", "success"))
            .await
            .unwrap();
        let flags = detector.evaluate(&second).await;
        assert!(flags.iter().all(|f| f.flag_type != "access_violation"));
    }

    #[tokio::test]
    async fn ordinary_paths_never_fire_access_flag() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let record = store.append(request(1, "/api/v1/videos/9", "success")).await.unwrap();
        let flags = detector.evaluate(&record).await;
        assert!(flags.iter().all(|f| f.flag_type != "access_violation"));
    }

    // -- suspicious-payload anomaly -------------------------------------------

    #[tokio::test]
    async fn drop_table_in_query_fires_security_flag() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let input = request_with_query(1, "/api/v1/search", "q=1;%20DROP TABLE videos");
        let record = store.append(input).await.unwrap();
        let flags = detector.evaluate(&record).await;

        let security = flags
            .iter()
            .find(|f| f.flag_type == "security_violation")
            .expect("security flag should fire");
        assert_eq!(security.priority, "high");
        assert_eq!(security.details_json["pattern"], r"drop\s+table");
    }

    #[tokio::test]
    async fn clean_payload_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let input = request_with_query(1, "/api/v1/search", "q=sunset%20timelapse&page=2");
        let record = store.append(input).await.unwrap();
        let flags = detector.evaluate(&record).await;
        assert!(flags.iter().all(|f| f.flag_type != "security_violation"));
    }

    // -- error-rate anomaly ---------------------------------------------------

    // Ratio definition: both numerator and denominator include the triggering
    // record; "error" means any non-success outcome (4xx warning or 5xx
    // failure).
    #[tokio::test]
    async fn six_failures_out_of_ten_fire_system_anomaly() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        for _ in 0..4 {
            store.append(request(1, "/api/v1/jobs", "success")).await.unwrap();
        }
        for _ in 0..5 {
            store.append(request(1, "/api/v1/jobs", "failure")).await.unwrap();
        }
        // The triggering failure is the 6th error and the 10th sample.
        let trigger = store.append(request(1, "/api/v1/jobs", "failure")).await.unwrap();
        let flags = detector.evaluate(&trigger).await;

        let anomaly = flags
            .iter()
            .find(|f| f.flag_type == "system_anomaly")
            .expect("system anomaly should fire");
        assert_eq!(anomaly.details_json["error_rate"].as_f64().unwrap(), 0.6);
        assert_eq!(anomaly.details_json["failure_count"], 6);
        assert_eq!(anomaly.details_json["sample_count"], 10);
    }

    #[tokio::test]
    async fn successful_response_never_triggers_error_rate_check() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        for _ in 0..9 {
            store.append(request(1, "/api/v1/jobs", "failure")).await.unwrap();
        }
        let trigger = store.append(request(1, "/api/v1/jobs", "success")).await.unwrap();
        let flags = detector.evaluate(&trigger).await;
        assert!(flags.iter().all(|f| f.flag_type != "system_anomaly"));
    }

    #[tokio::test]
    async fn error_rate_at_exactly_half_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        for _ in 0..5 {
            store.append(request(1, "/api/v1/jobs", "success")).await.unwrap();
        }
        for _ in 0..4 {
            store.append(request(1, "/api/v1/jobs", "failure")).await.unwrap();
        }
        // 5 errors of 10 == 0.5, which does not exceed the 0.5 threshold.
        let trigger = store.append(request(1, "/api/v1/jobs", "failure")).await.unwrap();
        let flags = detector.evaluate(&trigger).await;
        assert!(flags.iter().all(|f| f.flag_type != "system_anomaly"));
    }

    // -- duplicate findings ---------------------------------------------------

    // No idempotency key: the same condition re-fires a new flag on every
    // qualifying event.
    #[tokio::test]
    async fn repeated_evaluation_creates_duplicate_flags() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector_for(store.clone());

        let input = request_with_query(1, "/api/v1/search", "q=DROP TABLE x");
        let record = store.append(input).await.unwrap();
        detector.evaluate(&record).await;
        detector.evaluate(&record).await;

        let query = FlagQuery {
            flag_type: Some("security_violation".into()),
            ..Default::default()
        };
        assert_eq!(store.count_flags(&query).await.unwrap(), 2);
    }

    // -- check isolation ------------------------------------------------------

    /// Store whose history reads fail, while appends and flag writes work.
    /// Models a partially-degraded backend: checks that need history (rate,
    /// error rate) fail, the others keep working.
    struct BrokenHistoryStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ActivityStore for BrokenHistoryStore {
        async fn append(&self, input: CreateActivityRecord) -> Result<ActivityRecord, StoreError> {
            self.inner.append(input).await
        }
        async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>, StoreError> {
            self.inner.query(query).await
        }
        async fn count(&self, query: &ActivityQuery) -> Result<i64, StoreError> {
            self.inner.count(query).await
        }
        async fn recent_for_actor(
            &self,
            _actor_id: DbId,
            _limit: i64,
        ) -> Result<Vec<ActivityRecord>, StoreError> {
            Err(StoreError::Unavailable("history replica down".into()))
        }
        async fn count_actor_path(
            &self,
            actor_id: DbId,
            path: &str,
            exclude_id: DbId,
        ) -> Result<i64, StoreError> {
            self.inner.count_actor_path(actor_id, path, exclude_id).await
        }
        async fn export_range(
            &self,
            from: Timestamp,
            to: Timestamp,
            filters: &TrailFilters,
        ) -> Result<Vec<ActivityRecord>, StoreError> {
            self.inner.export_range(from, to, filters).await
        }
        async fn delete_older_than(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
            self.inner.delete_older_than(cutoff).await
        }
    }

    #[async_trait]
    impl FlagStore for BrokenHistoryStore {
        async fn create_flag(&self, input: CreateFlag) -> Result<Flag, StoreError> {
            self.inner.create_flag(input).await
        }
        async fn find_flag(&self, id: DbId) -> Result<Option<Flag>, StoreError> {
            self.inner.find_flag(id).await
        }
        async fn query_flags(&self, query: &FlagQuery) -> Result<Vec<Flag>, StoreError> {
            self.inner.query_flags(query).await
        }
        async fn count_flags(&self, query: &FlagQuery) -> Result<i64, StoreError> {
            self.inner.count_flags(query).await
        }
        async fn update_flag(
            &self,
            id: DbId,
            change: FlagChange,
        ) -> Result<Option<Flag>, StoreError> {
            self.inner.update_flag(id, change).await
        }
    }

    #[async_trait]
    impl TrailStore for BrokenHistoryStore {
        async fn create_trail(&self, input: CreateAuditTrail) -> Result<AuditTrail, StoreError> {
            self.inner.create_trail(input).await
        }
        async fn find_trail(&self, id: DbId) -> Result<Option<AuditTrail>, StoreError> {
            self.inner.find_trail(id).await
        }
        async fn list_trails(&self, limit: i64, offset: i64) -> Result<Vec<AuditTrail>, StoreError> {
            self.inner.list_trails(limit, offset).await
        }
        async fn count_trails(&self) -> Result<i64, StoreError> {
            self.inner.count_trails().await
        }
    }

    #[tokio::test]
    async fn failing_check_does_not_suppress_siblings() {
        let store = Arc::new(BrokenHistoryStore {
            inner: MemoryStore::new(),
        });
        let monitor = MonitorBus::default();
        let mut events = monitor.subscribe();
        let detector = AnomalyDetector::new(
            store.clone(),
            Arc::new(DetectionConfig::default()),
            monitor,
        );

        // Sensitive path AND injection payload; rate + error-rate checks will
        // fail on the broken history read.
        let input = request_with_query(1, "/api/v1/admin/users", "q=DROP TABLE users");
        let record = store.append(input).await.unwrap();
        let flags = detector.evaluate(&record).await;

        let types: Vec<&str> = flags.iter().map(|f| f.flag_type.as_str()).collect();
        assert!(types.contains(&"access_violation"));
        assert!(types.contains(&"security_violation"));

        // The failed rate check was reported on the side channel.
        let event = events.try_recv().expect("a check failure should be reported");
        assert_eq!(event.kind, MonitorEventKind::DetectorCheckFailed);
    }
}
