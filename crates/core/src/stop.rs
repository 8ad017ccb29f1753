//! Cooperative cancellation flag shared across every concurrency
//! domain: the HTTP pusher sets it on client disconnect, the runner
//! hands it to handlers, and the fan-out executor relays it to child
//! processes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap-to-clone stop flag. Setting is one-way.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// A fresh, unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative cancellation. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::StopSignal;

    #[test]
    fn clones_share_state() {
        let a = StopSignal::new();
        let b = a.clone();
        assert!(!b.is_set());
        a.set();
        assert!(b.is_set());
        a.set();
        assert!(a.is_set());
    }
}
