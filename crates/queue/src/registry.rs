//! Static handler registry.
//!
//! Job kinds form a closed enum and every kind maps to a handler
//! registered before the runner starts. Coverage is checked once at
//! startup; there is no runtime lookup that can fail on a live
//! request.

use acore::{AxonConfig, JobId, JobKind, StopSignal};
use anyhow::{Result, bail};
use channel::Producer;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

/// Everything a handler gets for one job. Handlers own no process
/// state beyond this context; live simulation state never outlives
/// the call.
pub struct JobContext {
    /// Correlation id of the job being run.
    pub id: JobId,
    /// The kind the handler was registered for.
    pub kind: JobKind,
    /// Opaque arguments from dispatch.
    pub args: Value,
    /// Writer for the job's channel.
    pub producer: Producer,
    /// Service configuration.
    pub config: AxonConfig,
    /// Cooperative cancellation, checked at safe points.
    pub stop: StopSignal,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A registered job handler.
pub type Handler = Arc<dyn Fn(JobContext) -> HandlerFuture + Send + Sync>;

/// Maps each [`JobKind`] to its handler.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<JobKind, Handler>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for one kind, replacing any previous one.
    pub fn register<F, Fut>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers
            .insert(kind, Arc::new(move |ctx| Box::pin(handler(ctx))));
    }

    /// Fail fast when any kind lacks a handler. Called once before the
    /// runner starts taking work.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = JobKind::all()
            .into_iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            bail!("no handler registered for: {}", missing.join(", "));
        }
        Ok(())
    }

    pub(crate) fn get(&self, kind: JobKind) -> Option<Handler> {
        self.handlers.get(&kind).cloned()
    }
}
