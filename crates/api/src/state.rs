use std::sync::Arc;

use vigil_db::store::SharedStore;
use vigil_events::MonitorBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`). The recording pipeline's enqueue handle travels separately, as
/// a request extension, because the recording middleware runs without
/// access to router state.
#[derive(Clone)]
pub struct AppState {
    /// Record store backend.
    pub store: SharedStore,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Side channel carrying pipeline errors and flag notices.
    pub monitor: MonitorBus,
}
