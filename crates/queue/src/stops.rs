//! Per-job stop signals.
//!
//! Cancellation propagates downward: the HTTP layer sets a job's
//! signal on disconnect or an explicit cancel, the runner hands the
//! same signal to the handler, and the handler relays it into any
//! fan-out it drives. The map keeps one signal per in-flight job so
//! all three sides observe the same flag.

use acore::{JobId, StopSignal};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared registry of live job stop signals.
#[derive(Clone, Default)]
pub struct StopMap(Arc<Mutex<HashMap<JobId, StopSignal>>>);

impl StopMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The signal for a job, created on first use. A cancel that
    /// arrives before the runner picks the job up lands on the same
    /// signal the runner will later observe.
    pub fn register(&self, id: &JobId) -> StopSignal {
        self.0
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// The signal for a job, if one is registered.
    pub fn get(&self, id: &JobId) -> Option<StopSignal> {
        self.0.lock().unwrap().get(id).cloned()
    }

    /// Request cancellation, registering the signal if needed.
    pub fn cancel(&self, id: &JobId) {
        self.register(id).set();
    }

    /// Drop a finished job's signal.
    pub fn remove(&self, id: &JobId) {
        self.0.lock().unwrap().remove(id);
    }
}
