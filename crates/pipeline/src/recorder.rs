//! Bounded recording queue and its worker task.
//!
//! Request middleware hands completed-request data to [`RecorderHandle`]
//! and returns immediately; the worker persists records and triggers
//! detection off the hot path. The queue is bounded: under overload jobs
//! are dropped (and reported) rather than growing without limit.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_db::models::CreateActivityRecord;
use vigil_db::store::SharedStore;
use vigil_events::{MonitorBus, MonitorEvent, MonitorEventKind};

use crate::detector::AnomalyDetector;

/// Default capacity of the recording queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Jobs and handle
// ---------------------------------------------------------------------------

/// One unit of detached work: persist a record and, when `detect` is set,
/// evaluate it for anomalies.
#[derive(Debug)]
pub struct RecordJob {
    pub record: CreateActivityRecord,
    pub detect: bool,
}

/// Cheaply cloneable enqueue handle used by request middleware.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecordJob>,
    monitor: MonitorBus,
}

impl RecorderHandle {
    /// Enqueue a job without waiting.
    ///
    /// A full queue drops the job and publishes a `QueueOverflow` event;
    /// the caller's response is never affected either way.
    pub fn try_enqueue(&self, job: RecordJob) {
        let actor_id = job.record.actor_id;
        let action_type = job.record.action_type.clone();
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    actor_id,
                    action_type = %action_type,
                    "Recording queue full, dropping activity record"
                );
                self.monitor.publish(
                    MonitorEvent::new(
                        MonitorEventKind::QueueOverflow,
                        "Recording queue full, activity record dropped",
                    )
                    .with_actor(actor_id)
                    .with_context(json!({ "action_type": action_type })),
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Shutdown path: the worker is gone, nothing left to record to.
                tracing::debug!(actor_id, "Recording worker stopped, dropping activity record");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Spawn the recording worker and return its enqueue handle.
///
/// The worker runs until `cancel` is triggered (draining already-queued
/// jobs first) or until every [`RecorderHandle`] has been dropped.
pub fn spawn(
    store: SharedStore,
    detector: Arc<AnomalyDetector>,
    monitor: MonitorBus,
    capacity: usize,
    cancel: CancellationToken,
) -> (RecorderHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = RecorderHandle {
        tx,
        monitor: monitor.clone(),
    };
    let join = tokio::spawn(run(store, detector, monitor, rx, cancel));
    (handle, join)
}

async fn run(
    store: SharedStore,
    detector: Arc<AnomalyDetector>,
    monitor: MonitorBus,
    mut rx: mpsc::Receiver<RecordJob>,
    cancel: CancellationToken,
) {
    tracing::info!("Activity recording worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Drain what is already queued so shutdown loses nothing
                // that was accepted.
                let mut drained = 0usize;
                while let Ok(job) = rx.try_recv() {
                    handle_job(&store, &detector, &monitor, job).await;
                    drained += 1;
                }
                tracing::info!(drained, "Activity recording worker stopping");
                break;
            }
            job = rx.recv() => match job {
                Some(job) => handle_job(&store, &detector, &monitor, job).await,
                None => {
                    tracing::info!("All recorder handles dropped, worker stopping");
                    break;
                }
            }
        }
    }
}

/// Persist one record and run detection on it.
///
/// Failures are reported on the monitor bus and logged; they never
/// propagate (the originating request finished long ago).
async fn handle_job(
    store: &SharedStore,
    detector: &AnomalyDetector,
    monitor: &MonitorBus,
    job: RecordJob,
) {
    let actor_id = job.record.actor_id;
    let action_type = job.record.action_type.clone();
    match store.append(job.record).await {
        Ok(record) => {
            tracing::debug!(
                record_id = record.id,
                actor_id,
                action_type = %action_type,
                "Activity record written"
            );
            if job.detect {
                detector.evaluate(&record).await;
            }
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                actor_id,
                action_type = %action_type,
                "Failed to persist activity record"
            );
            monitor.publish(
                MonitorEvent::new(
                    MonitorEventKind::RecordWriteFailed,
                    format!("Failed to persist activity record: {e}"),
                )
                .with_actor(actor_id)
                .with_context(json!({ "action_type": action_type })),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
