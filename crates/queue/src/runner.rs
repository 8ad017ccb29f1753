//! The in-process task runner.
//!
//! Consumes task descriptors one at a time, resolves the handler from
//! the static registry, and drives each job through its lifecycle:
//! mark running, relay status, run with the overall timeout, record
//! the terminal state, and close the channel on every path out.
//! Handler panics are caught at the spawn join and recorded as
//! computation failures rather than crashing the service.

use crate::dispatch::{Dispatcher, TaskDescriptor};
use crate::registry::{JobContext, Registry};
use crate::stops::StopMap;
use crate::store::JobStore;
use acore::{AxonConfig, AxonError, JobState};
use anyhow::Result;
use channel::{Producer, SharedStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Builds and starts the runner loop.
pub struct Runner {
    jobs: Arc<JobStore>,
    channels: SharedStore,
    registry: Arc<Registry>,
    config: AxonConfig,
    stops: StopMap,
}

/// Handle for the spawned runner task — holds the shutdown trigger.
pub struct RunnerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl RunnerHandle {
    /// Trigger graceful shutdown and wait for the loop to stop. The
    /// job in flight, if any, runs to completion first.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await?;
        }
        Ok(())
    }
}

impl Runner {
    /// Wire up a runner over the given stores and registry.
    pub fn new(
        jobs: Arc<JobStore>,
        channels: SharedStore,
        registry: Registry,
        config: AxonConfig,
        stops: StopMap,
    ) -> Self {
        Self {
            jobs,
            channels,
            registry: Arc::new(registry),
            config,
            stops,
        }
    }

    /// Validate handler coverage, recover jobs a previous process left
    /// queued, and spawn the loop. Returns the dispatcher feeding it.
    pub fn start(self) -> Result<(Dispatcher, RunnerHandle)> {
        self.registry.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let recovered = self.jobs.pending()?;
        if !recovered.is_empty() {
            tracing::info!("re-enqueueing {} jobs from a previous run", recovered.len());
            for descriptor in recovered {
                let _ = tx.send(descriptor);
            }
        }

        let dispatcher = Dispatcher::new(self.jobs.clone(), self.channels.clone(), tx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run_loop(rx, shutdown_rx));
        Ok((
            dispatcher,
            RunnerHandle {
                shutdown_tx: Some(shutdown_tx),
                join: Some(join),
            },
        ))
    }

    async fn run_loop(
        self,
        mut rx: mpsc::UnboundedReceiver<TaskDescriptor>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                descriptor = rx.recv() => match descriptor {
                    Some(descriptor) => self.run_one(descriptor).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    tracing::info!("runner shutting down");
                    break;
                }
            }
        }
    }

    /// Drive one job from queued to terminal. Never returns an error;
    /// every failure ends up in the job record and on the channel.
    async fn run_one(&self, descriptor: TaskDescriptor) {
        let TaskDescriptor { id, kind, args } = descriptor;
        let stop = self.stops.register(&id);
        let producer = Producer::new(self.channels.clone(), &id);

        let outcome = if stop.is_set() {
            tracing::info!("job {id} cancelled while queued");
            Err("cancelled before start".to_owned())
        } else {
            match self.jobs.mark_running(&id) {
                Ok(true) => {
                    if let Err(e) = producer.send_status(JobState::Running, None) {
                        tracing::warn!("job {id}: relaying running status: {e}");
                    }
                    self.execute(&id, kind, args, &stop).await
                }
                Ok(false) => {
                    // Already past queued; nothing to run.
                    self.stops.remove(&id);
                    return;
                }
                Err(e) => Err(format!("marking job running: {e}")),
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!("job {id} succeeded");
                if let Err(e) = self.jobs.mark_finished(&id, true, None) {
                    tracing::error!("job {id}: recording success: {e}");
                }
                let _ = producer.send_status(JobState::Succeeded, None);
            }
            Err(detail) => {
                tracing::warn!("job {id} failed: {detail}");
                if let Err(e) = self.jobs.mark_finished(&id, false, Some(&detail)) {
                    tracing::error!("job {id}: recording failure: {e}");
                }
                let _ = producer.send_status(JobState::Failed, Some(detail));
            }
        }
        if let Err(e) = producer.close() {
            tracing::warn!("job {id}: closing channel: {e}");
        }
        self.stops.remove(&id);
    }

    /// Run the handler under the overall job timeout. The returned
    /// error string is the human-readable detail for the record and
    /// the terminal status message.
    async fn execute(
        &self,
        id: &acore::JobId,
        kind: acore::JobKind,
        args: serde_json::Value,
        stop: &acore::StopSignal,
    ) -> Result<(), String> {
        let Some(handler) = self.registry.get(kind) else {
            // validate() makes this unreachable in a served process.
            return Err(format!("no handler for {kind}"));
        };

        let context = JobContext {
            id: id.clone(),
            kind,
            args,
            producer: Producer::new(self.channels.clone(), id),
            config: self.config.clone(),
            stop: stop.clone(),
        };

        let mut task = tokio::spawn(handler(context));
        let waited = self.config.job_timeout();
        match tokio::time::timeout(waited, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AxonError::computation(kind.as_str(), format!("{e:#}")).to_string()),
            Ok(Err(join)) => {
                if join.is_panic() {
                    Err(AxonError::computation(kind.as_str(), "handler panicked").to_string())
                } else {
                    Err("handler task was aborted".to_owned())
                }
            }
            Err(_) => {
                // Cancel downward, then reap the task so no fan-out
                // children outlive the deadline.
                stop.set();
                task.abort();
                let _ = task.await;
                Err(AxonError::Timeout { waited }.to_string())
            }
        }
    }
}
