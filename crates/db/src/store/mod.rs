//! The record-store interface.
//!
//! The monitoring core never talks to a storage engine directly; it goes
//! through these traits. Two backends ship in this crate: [`memory`] for
//! tests and embedded use, [`postgres`] for production.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use vigil_core::types::{DbId, Timestamp};

use crate::models::{
    ActivityQuery, ActivityRecord, AuditTrail, CreateActivityRecord, CreateAuditTrail, CreateFlag,
    Flag, FlagChange, FlagQuery, TrailFilters,
};

/// Default page size for queries that do not specify a limit.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Hard cap on page size regardless of what the caller asks for.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Clamp a caller-supplied limit into `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure inside a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Activity store
// ---------------------------------------------------------------------------

/// Append/query store for activity records. Strictly append-only apart from
/// retention cleanup.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Append a record. `created_at` is stamped at write time.
    async fn append(&self, input: CreateActivityRecord) -> Result<ActivityRecord, StoreError>;

    /// Query records, newest first, with pagination.
    async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>, StoreError>;

    /// Count records matching the filter (for pagination metadata).
    async fn count(&self, query: &ActivityQuery) -> Result<i64, StoreError>;

    /// The actor's most recent records, newest first, capped at `limit`.
    async fn recent_for_actor(
        &self,
        actor_id: DbId,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    /// Count the actor's records for an exact request path, excluding one
    /// record id (the record currently under evaluation).
    async fn count_actor_path(
        &self,
        actor_id: DbId,
        path: &str,
        exclude_id: DbId,
    ) -> Result<i64, StoreError>;

    /// All records in `[from, to]` passing `filters`, oldest first.
    /// Unpaginated: trail creation and export need the full window.
    async fn export_range(
        &self,
        from: Timestamp,
        to: Timestamp,
        filters: &TrailFilters,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    /// Delete records older than `cutoff`; returns how many were removed.
    /// Used only by retention cleanup.
    async fn delete_older_than(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Flag store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Create a flag. The stored status is always `new`.
    async fn create_flag(&self, input: CreateFlag) -> Result<Flag, StoreError>;

    async fn find_flag(&self, id: DbId) -> Result<Option<Flag>, StoreError>;

    /// Query flags, newest first, with pagination.
    async fn query_flags(&self, query: &FlagQuery) -> Result<Vec<Flag>, StoreError>;

    async fn count_flags(&self, query: &FlagQuery) -> Result<i64, StoreError>;

    /// Apply a partial change; returns the updated flag, or `None` for an
    /// unknown id. Stamps `updated_at`.
    async fn update_flag(&self, id: DbId, change: FlagChange) -> Result<Option<Flag>, StoreError>;
}

// ---------------------------------------------------------------------------
// Trail store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TrailStore: Send + Sync {
    async fn create_trail(&self, input: CreateAuditTrail) -> Result<AuditTrail, StoreError>;

    async fn find_trail(&self, id: DbId) -> Result<Option<AuditTrail>, StoreError>;

    /// List trails, newest first.
    async fn list_trails(&self, limit: i64, offset: i64) -> Result<Vec<AuditTrail>, StoreError>;

    async fn count_trails(&self) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Combined store
// ---------------------------------------------------------------------------

/// The full store surface the monitoring core is wired against.
pub trait Store: ActivityStore + FlagStore + TrailStore {}

impl<T: ActivityStore + FlagStore + TrailStore> Store for T {}

/// Shared handle to a store backend.
pub type SharedStore = Arc<dyn Store>;
