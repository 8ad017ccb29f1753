//! The HTTP gateway: shared state, routes, the NDJSON pusher, and the
//! serve entrypoint.

pub mod push;
pub mod routes;
pub mod serve;

use acore::AxonConfig;
use channel::SharedStore;
use queue::{Dispatcher, JobStore, StopMap};
use std::sync::Arc;

/// State shared by every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Job bookkeeping, the polling surface.
    pub jobs: Arc<JobStore>,
    /// Channel store, the streaming surface.
    pub channels: SharedStore,
    /// Accepts submissions.
    pub dispatcher: Dispatcher,
    /// Per-job cancellation signals.
    pub stops: StopMap,
    /// Service tuning.
    pub config: AxonConfig,
}
