//! The accepted/completed boundary.
//!
//! Dispatch persists a job record and wakes the runner, then returns
//! without waiting for execution to start. The job's channel key is
//! derived deterministically from its id, so the worker-side producer
//! and any streaming reader meet on the same channel with no further
//! coordination.

use crate::store::JobStore;
use acore::{AxonError, JobHandle, JobId, JobKind, JobState};
use channel::{Producer, SharedStore};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the runner needs to execute one job.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Correlation id, also the channel key seed.
    pub id: JobId,
    /// Which registered handler runs.
    pub kind: JobKind,
    /// Opaque handler arguments.
    pub args: Value,
}

/// Submits work and returns immediately.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: Arc<JobStore>,
    channels: SharedStore,
    tx: mpsc::UnboundedSender<TaskDescriptor>,
}

impl Dispatcher {
    pub(crate) fn new(
        jobs: Arc<JobStore>,
        channels: SharedStore,
        tx: mpsc::UnboundedSender<TaskDescriptor>,
    ) -> Self {
        Self { jobs, channels, tx }
    }

    /// Submit a job under a fresh correlation id.
    pub fn dispatch(&self, kind: JobKind, args: Value) -> Result<JobHandle, AxonError> {
        self.dispatch_with_id(JobId::new(), kind, args)
    }

    /// Submit under a caller-supplied id. Re-dispatching an id that is
    /// already known returns the original handle without enqueueing
    /// the work twice, which makes retries idempotent.
    pub fn dispatch_with_id(
        &self,
        id: JobId,
        kind: JobKind,
        args: Value,
    ) -> Result<JobHandle, AxonError> {
        if let Some(record) = self.jobs.get(&id)? {
            tracing::debug!("job {id} already dispatched, returning existing handle");
            return Ok(JobHandle {
                id: record.id,
                kind: record.kind,
                submitted_at: record.created_at,
            });
        }

        let handle = JobHandle {
            id,
            kind,
            submitted_at: Utc::now(),
        };
        self.jobs.insert(&handle, &args)?;
        // Open the channel now so a streaming caller can attach before
        // the runner's first write.
        Producer::new(self.channels.clone(), &handle.id)
            .send_status(JobState::Queued, None)?;
        self.tx
            .send(TaskDescriptor {
                id: handle.id.clone(),
                kind,
                args,
            })
            .map_err(|_| AxonError::Transport("runner is gone".to_owned()))?;
        tracing::info!("dispatched {kind} job {}", handle.id);
        Ok(handle)
    }
}
