//! Polling job status monitor.
//!
//! For callers that want callbacks instead of a live stream. The
//! monitor polls the job table on its own schedule and fires each
//! lifecycle callback exactly once, keyed on the last state it acted
//! on rather than the last state it saw: observing `running` twice
//! fires nothing twice, and a poll that skips straight from queued to
//! a terminal state still fires `on_start` first, preserving the
//! logical order the physical poll missed.

use crate::store::JobStore;
use acore::{AxonError, JobHandle, JobState};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle callbacks. Each fires at most once per monitored job;
/// `on_success` and `on_failure` are mutually exclusive.
pub struct MonitorCallbacks {
    /// The job left the queue.
    pub on_start: Box<dyn FnMut() + Send>,
    /// The job reached `succeeded`.
    pub on_success: Box<dyn FnMut() + Send>,
    /// The job reached `failed`, or the monitor's own deadline passed.
    pub on_failure: Box<dyn FnMut(&str) + Send>,
    /// Queue position changed while still queued. Fired per change,
    /// not per poll.
    pub on_position: Box<dyn FnMut(u32) + Send>,
}

impl Default for MonitorCallbacks {
    fn default() -> Self {
        Self {
            on_start: Box::new(|| {}),
            on_success: Box::new(|| {}),
            on_failure: Box::new(|_| {}),
            on_position: Box::new(|_| {}),
        }
    }
}

/// Poll `handle`'s record until it reaches a terminal state or the
/// overall `timeout` passes.
///
/// On timeout the monitor stops, fires `on_failure` once, and returns
/// [`AxonError::Timeout`] — a distinct failure from the job itself
/// failing. The loop is a plain future: dropping it cancels the
/// monitor without leaking a task.
pub async fn monitor(
    jobs: Arc<JobStore>,
    handle: &JobHandle,
    mut callbacks: MonitorCallbacks,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), AxonError> {
    let deadline = tokio::time::Instant::now() + timeout;
    // Dispatch already observed "queued"; it is the first acted state.
    let mut acted = JobState::Queued;
    let mut last_position: Option<u32> = None;

    loop {
        let record = jobs.get(&handle.id)?.ok_or_else(|| {
            AxonError::Transport(format!("job {} vanished from the queue", handle.id))
        })?;

        match record.status {
            JobState::Queued => {
                if record.queue_position != last_position {
                    if let Some(position) = record.queue_position {
                        (callbacks.on_position)(position);
                    }
                    last_position = record.queue_position;
                }
            }
            JobState::Running => {
                if acted.rank() < JobState::Running.rank() {
                    (callbacks.on_start)();
                    acted = JobState::Running;
                }
            }
            terminal => {
                // Replay a skipped start transition before the
                // terminal callback.
                if acted.rank() < JobState::Running.rank() {
                    (callbacks.on_start)();
                }
                match terminal {
                    JobState::Succeeded => (callbacks.on_success)(),
                    _ => (callbacks.on_failure)(record.error.as_deref().unwrap_or("job failed")),
                }
                return Ok(());
            }
        }

        if tokio::time::Instant::now() >= deadline {
            (callbacks.on_failure)(&format!("monitor timed out after {timeout:?}"));
            return Err(AxonError::Timeout { waited: timeout });
        }
        tokio::time::sleep(poll_interval).await;
    }
}
