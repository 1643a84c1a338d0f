//! In-memory store backend.
//!
//! Backs the integration test suites and embedded deployments. Ids are
//! monotone counters and `created_at` is stamped on append, so record order
//! is store-write order, matching the PostgreSQL backend's BIGSERIAL
//! behaviour.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vigil_core::types::{DbId, Timestamp};

use crate::models::{
    ActivityQuery, ActivityRecord, AuditTrail, CreateActivityRecord, CreateAuditTrail, CreateFlag,
    Flag, FlagChange, FlagQuery, TrailFilters,
};
use crate::store::{clamp_limit, ActivityStore, FlagStore, StoreError, TrailStore};

#[derive(Default)]
struct Inner {
    activity: Vec<ActivityRecord>,
    flags: Vec<Flag>,
    trails: Vec<AuditTrail>,
    next_activity_id: DbId,
    next_flag_id: DbId,
    next_trail_id: DbId,
}

/// Store backend holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with an explicit `created_at`.
    ///
    /// For backfill imports and test seeding; normal recording goes through
    /// [`ActivityStore::append`], which stamps write time.
    pub async fn append_backdated(
        &self,
        input: CreateActivityRecord,
        created_at: Timestamp,
    ) -> ActivityRecord {
        let mut inner = self.inner.write().await;
        inner.push_activity(input, created_at)
    }
}

impl Inner {
    fn push_activity(&mut self, input: CreateActivityRecord, created_at: Timestamp) -> ActivityRecord {
        self.next_activity_id += 1;
        let record = ActivityRecord {
            id: self.next_activity_id,
            actor_id: input.actor_id,
            session_id: input.session_id,
            action_type: input.action_type,
            target_id: input.target_id,
            ip_address: input.ip_address,
            status: input.status,
            detail_json: input.detail_json,
            created_at,
        };
        self.activity.push(record.clone());
        record
    }
}

// ---------------------------------------------------------------------------
// Filter predicates
// ---------------------------------------------------------------------------

fn activity_matches(query: &ActivityQuery, record: &ActivityRecord) -> bool {
    if let Some(actor_id) = query.actor_id {
        if record.actor_id != actor_id {
            return false;
        }
    }
    if let Some(ref action_type) = query.action_type {
        if &record.action_type != action_type {
            return false;
        }
    }
    if let Some(ref status) = query.status {
        if &record.status != status {
            return false;
        }
    }
    if let Some(from) = query.from {
        if record.created_at < from {
            return false;
        }
    }
    if let Some(to) = query.to {
        if record.created_at > to {
            return false;
        }
    }
    true
}

fn flag_matches(query: &FlagQuery, flag: &Flag) -> bool {
    if let Some(ref flag_type) = query.flag_type {
        if &flag.flag_type != flag_type {
            return false;
        }
    }
    if let Some(ref status) = query.status {
        if &flag.status != status {
            return false;
        }
    }
    if let Some(ref priority) = query.priority {
        if &flag.priority != priority {
            return false;
        }
    }
    if let Some(actor_id) = query.actor_id {
        if flag.actor_id != Some(actor_id) {
            return false;
        }
    }
    if let Some(assigned_to) = query.assigned_to {
        if flag.assigned_to != Some(assigned_to) {
            return false;
        }
    }
    if let Some(from) = query.from {
        if flag.created_at < from {
            return false;
        }
    }
    if let Some(to) = query.to {
        if flag.created_at > to {
            return false;
        }
    }
    if let Some(ref search) = query.search {
        let needle = search.to_lowercase();
        let in_message = flag.message.to_lowercase().contains(&needle);
        let in_notes = flag
            .investigation_notes
            .as_deref()
            .is_some_and(|notes| notes.to_lowercase().contains(&needle));
        if !in_message && !in_notes {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// ActivityStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn append(&self, input: CreateActivityRecord) -> Result<ActivityRecord, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.push_activity(input, Utc::now()))
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>, StoreError> {
        let limit = clamp_limit(query.limit) as usize;
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .iter()
            .rev()
            .filter(|r| activity_matches(query, r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, query: &ActivityQuery) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .iter()
            .filter(|r| activity_matches(query, r))
            .count() as i64)
    }

    async fn recent_for_actor(
        &self,
        actor_id: DbId,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .iter()
            .rev()
            .filter(|r| r.actor_id == actor_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_actor_path(
        &self,
        actor_id: DbId,
        path: &str,
        exclude_id: DbId,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .iter()
            .filter(|r| r.actor_id == actor_id && r.id != exclude_id && r.detail().path == path)
            .count() as i64)
    }

    async fn export_range(
        &self,
        from: Timestamp,
        to: Timestamp,
        filters: &TrailFilters,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activity
            .iter()
            .filter(|r| {
                r.created_at >= from
                    && r.created_at <= to
                    && filters.matches(r.actor_id, &r.action_type, &r.status)
            })
            .cloned()
            .collect())
    }

    async fn delete_older_than(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.activity.len();
        inner.activity.retain(|r| r.created_at >= cutoff);
        Ok((before - inner.activity.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// FlagStore
// ---------------------------------------------------------------------------

#[async_trait]
impl FlagStore for MemoryStore {
    async fn create_flag(&self, input: CreateFlag) -> Result<Flag, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_flag_id += 1;
        let now = Utc::now();
        let flag = Flag {
            id: inner.next_flag_id,
            flag_type: input.flag_type,
            message: input.message,
            actor_id: input.actor_id,
            session_id: input.session_id,
            activity_id: input.activity_id,
            status: vigil_core::flag::FlagStatus::New.as_str().to_string(),
            priority: input.priority,
            details_json: input.details_json,
            confidence_score: vigil_core::flag::clamp_score(input.confidence_score),
            anomaly_score: vigil_core::flag::clamp_score(input.anomaly_score),
            assigned_to: None,
            investigation_notes: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        };
        inner.flags.push(flag.clone());
        Ok(flag)
    }

    async fn find_flag(&self, id: DbId) -> Result<Option<Flag>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.flags.iter().find(|f| f.id == id).cloned())
    }

    async fn query_flags(&self, query: &FlagQuery) -> Result<Vec<Flag>, StoreError> {
        let limit = clamp_limit(query.limit) as usize;
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let inner = self.inner.read().await;
        Ok(inner
            .flags
            .iter()
            .rev()
            .filter(|f| flag_matches(query, f))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_flags(&self, query: &FlagQuery) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.flags.iter().filter(|f| flag_matches(query, f)).count() as i64)
    }

    async fn update_flag(&self, id: DbId, change: FlagChange) -> Result<Option<Flag>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(flag) = inner.flags.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };
        if let Some(status) = change.status {
            flag.status = status;
        }
        if let Some(assigned_to) = change.assigned_to {
            flag.assigned_to = Some(assigned_to);
        }
        if let Some(line) = change.append_note {
            flag.investigation_notes = Some(vigil_core::flag::append_note(
                flag.investigation_notes.as_deref(),
                &line,
            ));
        }
        if let Some(resolved_by) = change.resolved_by {
            flag.resolved_by = Some(resolved_by);
        }
        if let Some(resolved_at) = change.resolved_at {
            flag.resolved_at = Some(resolved_at);
        }
        if let Some(notes) = change.resolution_notes {
            flag.resolution_notes = Some(notes);
        }
        flag.updated_at = Utc::now();
        Ok(Some(flag.clone()))
    }
}

// ---------------------------------------------------------------------------
// TrailStore
// ---------------------------------------------------------------------------

#[async_trait]
impl TrailStore for MemoryStore {
    async fn create_trail(&self, input: CreateAuditTrail) -> Result<AuditTrail, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_trail_id += 1;
        let trail = AuditTrail {
            id: inner.next_trail_id,
            created_by: input.created_by,
            name: input.name,
            window_start: input.window_start,
            window_end: input.window_end,
            filters_json: input.filters_json,
            source_log_ids: input.source_log_ids,
            snapshot_json: input.snapshot_json,
            created_at: Utc::now(),
        };
        inner.trails.push(trail.clone());
        Ok(trail)
    }

    async fn find_trail(&self, id: DbId) -> Result<Option<AuditTrail>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.trails.iter().find(|t| t.id == id).cloned())
    }

    async fn list_trails(&self, limit: i64, offset: i64) -> Result<Vec<AuditTrail>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trails
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(clamp_limit(Some(limit)) as usize)
            .cloned()
            .collect())
    }

    async fn count_trails(&self) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.trails.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
