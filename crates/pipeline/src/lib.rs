//! Detached background machinery for the monitoring core.
//!
//! Recording and detection run strictly after the response has been sent:
//! request middleware enqueues a [`recorder::RecordJob`] on a bounded queue,
//! and the recording worker persists it and hands it to the
//! [`detector::AnomalyDetector`]. Nothing in this crate can fail the
//! originating request; failures go to the monitor bus.

pub mod detector;
pub mod recorder;

pub use detector::AnomalyDetector;
pub use recorder::{RecordJob, RecorderHandle};
