//! PostgreSQL store backend.
//!
//! All tables are append-first: `activity_records` and `audit_trails` never
//! see an UPDATE, and flags are only mutated through [`FlagStore::update_flag`].

use async_trait::async_trait;
use vigil_core::flag::{clamp_score, FlagStatus};
use vigil_core::types::{DbId, Timestamp};

use crate::models::{
    ActivityQuery, ActivityRecord, AuditTrail, CreateActivityRecord, CreateAuditTrail, CreateFlag,
    Flag, FlagChange, FlagQuery, TrailFilters,
};
use crate::store::{clamp_limit, ActivityStore, FlagStore, StoreError, TrailStore};
use crate::DbPool;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `activity_records` SELECT queries.
const ACTIVITY_COLUMNS: &str = "\
    id, actor_id, session_id, action_type, target_id, \
    ip_address, status, detail_json, created_at";

/// Column list for INSERT (excludes auto-generated `id` and `created_at`).
const ACTIVITY_INSERT_COLUMNS: &str = "\
    actor_id, session_id, action_type, target_id, ip_address, status, detail_json";

/// Column list for `flags` SELECT queries.
const FLAG_COLUMNS: &str = "\
    id, flag_type, message, actor_id, session_id, activity_id, status, priority, \
    details_json, confidence_score, anomaly_score, assigned_to, investigation_notes, \
    resolved_by, resolved_at, resolution_notes, created_at, updated_at";

/// Column list for `audit_trails` SELECT queries.
const TRAIL_COLUMNS: &str = "\
    id, created_by, name, window_start, window_end, filters_json, \
    source_log_ids, snapshot_json, created_at";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store backend over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// ActivityStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ActivityStore for PostgresStore {
    async fn append(&self, input: CreateActivityRecord) -> Result<ActivityRecord, StoreError> {
        let query = format!(
            "INSERT INTO activity_records ({ACTIVITY_INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ACTIVITY_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ActivityRecord>(&query)
            .bind(input.actor_id)
            .bind(&input.session_id)
            .bind(&input.action_type)
            .bind(input.target_id)
            .bind(&input.ip_address)
            .bind(&input.status)
            .bind(&input.detail_json)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn query(&self, params: &ActivityQuery) -> Result<Vec<ActivityRecord>, StoreError> {
        let limit = clamp_limit(params.limit);
        let offset = params.offset.unwrap_or(0).max(0);

        let (where_clause, bind_values, bind_idx) = build_activity_filter(params);
        let query = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_records {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let q = bind_values_as(sqlx::query_as::<_, ActivityRecord>(&query), &bind_values);
        Ok(q.bind(limit).bind(offset).fetch_all(&self.pool).await?)
    }

    async fn count(&self, params: &ActivityQuery) -> Result<i64, StoreError> {
        let (where_clause, bind_values, _) = build_activity_filter(params);
        let query = format!("SELECT COUNT(*)::BIGINT FROM activity_records {where_clause}");
        let q = bind_values_scalar(sqlx::query_scalar::<_, i64>(&query), &bind_values);
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn recent_for_actor(
        &self,
        actor_id: DbId,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let query = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_records \
             WHERE actor_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        Ok(sqlx::query_as::<_, ActivityRecord>(&query)
            .bind(actor_id)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_actor_path(
        &self,
        actor_id: DbId,
        path: &str,
        exclude_id: DbId,
    ) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM activity_records \
             WHERE actor_id = $1 AND id <> $2 AND detail_json->>'path' = $3",
        )
        .bind(actor_id)
        .bind(exclude_id)
        .bind(path)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn export_range(
        &self,
        from: Timestamp,
        to: Timestamp,
        filters: &TrailFilters,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut conditions = vec!["created_at >= $1".to_string(), "created_at <= $2".to_string()];
        let mut bind_idx = 3u32;
        let mut bind_values: Vec<BindValue> = Vec::new();

        if let Some(actor_id) = filters.actor_id {
            conditions.push(format!("actor_id = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::BigInt(actor_id));
        }
        if let Some(ref action_type) = filters.action_type {
            conditions.push(format!("action_type = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::Text(action_type.clone()));
        }
        if let Some(ref status) = filters.status {
            conditions.push(format!("status = ${bind_idx}"));
            let _ = bind_idx;
            bind_values.push(BindValue::Text(status.clone()));
        }

        let query = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_records WHERE {} \
             ORDER BY created_at ASC, id ASC",
            conditions.join(" AND ")
        );

        let q = sqlx::query_as::<_, ActivityRecord>(&query).bind(from).bind(to);
        let q = bind_values_as(q, &bind_values);
        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn delete_older_than(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM activity_records WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// FlagStore
// ---------------------------------------------------------------------------

#[async_trait]
impl FlagStore for PostgresStore {
    async fn create_flag(&self, input: CreateFlag) -> Result<Flag, StoreError> {
        let query = format!(
            "INSERT INTO flags (flag_type, message, actor_id, session_id, activity_id, \
             status, priority, details_json, confidence_score, anomaly_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {FLAG_COLUMNS}"
        );
        let flag = sqlx::query_as::<_, Flag>(&query)
            .bind(&input.flag_type)
            .bind(&input.message)
            .bind(input.actor_id)
            .bind(&input.session_id)
            .bind(input.activity_id)
            .bind(FlagStatus::New.as_str())
            .bind(&input.priority)
            .bind(&input.details_json)
            .bind(clamp_score(input.confidence_score))
            .bind(clamp_score(input.anomaly_score))
            .fetch_one(&self.pool)
            .await?;
        Ok(flag)
    }

    async fn find_flag(&self, id: DbId) -> Result<Option<Flag>, StoreError> {
        let query = format!("SELECT {FLAG_COLUMNS} FROM flags WHERE id = $1");
        Ok(sqlx::query_as::<_, Flag>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn query_flags(&self, params: &FlagQuery) -> Result<Vec<Flag>, StoreError> {
        let limit = clamp_limit(params.limit);
        let offset = params.offset.unwrap_or(0).max(0);

        let (where_clause, bind_values, bind_idx) = build_flag_filter(params);
        let query = format!(
            "SELECT {FLAG_COLUMNS} FROM flags {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let q = bind_values_as(sqlx::query_as::<_, Flag>(&query), &bind_values);
        Ok(q.bind(limit).bind(offset).fetch_all(&self.pool).await?)
    }

    async fn count_flags(&self, params: &FlagQuery) -> Result<i64, StoreError> {
        let (where_clause, bind_values, _) = build_flag_filter(params);
        let query = format!("SELECT COUNT(*)::BIGINT FROM flags {where_clause}");
        let q = bind_values_scalar(sqlx::query_scalar::<_, i64>(&query), &bind_values);
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn update_flag(&self, id: DbId, change: FlagChange) -> Result<Option<Flag>, StoreError> {
        let mut sets: Vec<String> = vec!["updated_at = now()".to_string()];
        let mut bind_idx = 2u32; // $1 is the flag id
        let mut bind_values: Vec<BindValue> = Vec::new();

        if let Some(status) = change.status {
            sets.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::Text(status));
        }
        if let Some(assigned_to) = change.assigned_to {
            sets.push(format!("assigned_to = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::BigInt(assigned_to));
        }
        if let Some(line) = change.append_note {
            // Numbered parameters may repeat, so the same bind serves both arms.
            sets.push(format!(
                "investigation_notes = CASE \
                 WHEN investigation_notes IS NULL OR investigation_notes = '' THEN ${bind_idx} \
                 ELSE investigation_notes || E'\\n' || ${bind_idx} END"
            ));
            bind_idx += 1;
            bind_values.push(BindValue::Text(line));
        }
        if let Some(resolved_by) = change.resolved_by {
            sets.push(format!("resolved_by = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::BigInt(resolved_by));
        }
        if let Some(resolved_at) = change.resolved_at {
            sets.push(format!("resolved_at = ${bind_idx}"));
            bind_idx += 1;
            bind_values.push(BindValue::Timestamp(resolved_at));
        }
        if let Some(notes) = change.resolution_notes {
            sets.push(format!("resolution_notes = ${bind_idx}"));
            let _ = bind_idx;
            bind_values.push(BindValue::Text(notes));
        }

        let query = format!(
            "UPDATE flags SET {} WHERE id = $1 RETURNING {FLAG_COLUMNS}",
            sets.join(", ")
        );

        let q = sqlx::query_as::<_, Flag>(&query).bind(id);
        let q = bind_values_as(q, &bind_values);
        Ok(q.fetch_optional(&self.pool).await?)
    }
}

// ---------------------------------------------------------------------------
// TrailStore
// ---------------------------------------------------------------------------

#[async_trait]
impl TrailStore for PostgresStore {
    async fn create_trail(&self, input: CreateAuditTrail) -> Result<AuditTrail, StoreError> {
        let query = format!(
            "INSERT INTO audit_trails (created_by, name, window_start, window_end, \
             filters_json, source_log_ids, snapshot_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TRAIL_COLUMNS}"
        );
        let trail = sqlx::query_as::<_, AuditTrail>(&query)
            .bind(input.created_by)
            .bind(&input.name)
            .bind(input.window_start)
            .bind(input.window_end)
            .bind(&input.filters_json)
            .bind(&input.source_log_ids)
            .bind(&input.snapshot_json)
            .fetch_one(&self.pool)
            .await?;
        Ok(trail)
    }

    async fn find_trail(&self, id: DbId) -> Result<Option<AuditTrail>, StoreError> {
        let query = format!("SELECT {TRAIL_COLUMNS} FROM audit_trails WHERE id = $1");
        Ok(sqlx::query_as::<_, AuditTrail>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_trails(&self, limit: i64, offset: i64) -> Result<Vec<AuditTrail>, StoreError> {
        let query = format!(
            "SELECT {TRAIL_COLUMNS} FROM audit_trails \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        Ok(sqlx::query_as::<_, AuditTrail>(&query)
            .bind(clamp_limit(Some(limit)))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_trails(&self) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::BIGINT FROM audit_trails")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built queries.
enum BindValue {
    BigInt(i64),
    Text(String),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from `ActivityQuery` filters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`; the clause is
/// empty when no filters are active.
fn build_activity_filter(params: &ActivityQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(actor_id) = params.actor_id {
        conditions.push(format!("actor_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(actor_id));
    }
    if let Some(ref action_type) = params.action_type {
        conditions.push(format!("action_type = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(action_type.clone()));
    }
    if let Some(ref status) = params.status {
        conditions.push(format!("status = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(status.clone()));
    }
    if let Some(from) = params.from {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }
    if let Some(to) = params.to {
        conditions.push(format!("created_at <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

/// Build a WHERE clause and bind values from `FlagQuery` filters.
fn build_flag_filter(params: &FlagQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(ref flag_type) = params.flag_type {
        conditions.push(format!("flag_type = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(flag_type.clone()));
    }
    if let Some(ref status) = params.status {
        conditions.push(format!("status = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(status.clone()));
    }
    if let Some(ref priority) = params.priority {
        conditions.push(format!("priority = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(priority.clone()));
    }
    if let Some(actor_id) = params.actor_id {
        conditions.push(format!("actor_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(actor_id));
    }
    if let Some(assigned_to) = params.assigned_to {
        conditions.push(format!("assigned_to = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(assigned_to));
    }
    if let Some(ref search) = params.search {
        conditions.push(format!(
            "(message ILIKE ${bind_idx} OR investigation_notes ILIKE ${bind_idx})"
        ));
        bind_idx += 1;
        bind_values.push(BindValue::Text(format!("%{search}%")));
    }
    if let Some(from) = params.from {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }
    if let Some(to) = params.to {
        conditions.push(format!("created_at <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

/// Bind a slice of `BindValue` to a sqlx `QueryAs`.
fn bind_values_as<'q, O>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::BigInt(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

/// Bind a slice of `BindValue` to a sqlx `QueryScalar`.
fn bind_values_scalar<'q>(
    mut q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::BigInt(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}
