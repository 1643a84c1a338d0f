//! Periodic cleanup of old activity records.
//!
//! Spawns a background task that deletes activity records older than the
//! configured retention period. Runs on a fixed interval using
//! `tokio::time::interval`. Flags and audit trails are never purged: trails
//! are immutable compliance artifacts whose snapshots outlive the records
//! they were built from.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use vigil_db::store::SharedStore;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the activity retention cleanup loop.
///
/// Deletes activity records older than `retention_days`. Runs until
/// `cancel` is triggered.
pub async fn run(store: SharedStore, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Activity retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Activity retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                match store.delete_older_than(cutoff).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Activity retention: purged old records");
                        } else {
                            tracing::debug!("Activity retention: no records to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Activity retention: cleanup failed");
                    }
                }
            }
        }
    }
}
