//! In-process monitoring events.
//!
//! The recording pipeline and the anomaly detector run detached from the
//! request/response cycle, so their failures cannot surface to the HTTP
//! caller. The [`bus::MonitorBus`] is the side channel those components
//! report through instead.

pub mod bus;

pub use bus::{MonitorBus, MonitorEvent, MonitorEventKind};
