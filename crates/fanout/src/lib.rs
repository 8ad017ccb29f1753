//! Multiprocess fan-out executor.
//!
//! Decomposes one logical job into N independent sub-computations,
//! one OS process per parameter set. Processes are the isolation
//! boundary on purpose: the simulation engine mutates process-global
//! state, so every worker gets a fresh address space and is recycled
//! after exactly one parameter set.
//!
//! The parent and its children share exactly two things: a result
//! queue (child stdout lines funneled into one mpsc channel) and a
//! stop signal (relayed as a control line on child stdin). Everything
//! else is owned by exactly one process.

pub use child::{ChildSink, ChildTask, run_child};
pub use pool::ChildCommand;

pub mod child;
mod pool;

use acore::{AxonError, PartialResult, StopSignal};
use pool::Pool;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result queue depth. Children block on a full pipe, so this only
/// bounds parent-side buffering.
const QUEUE_DEPTH: usize = 256;

/// Empty polls with a dead process table before the run is declared
/// silently dead.
const DEAD_POLLS: u32 = 2;

/// Everything needed to run one fan-out.
pub struct FanoutSpec {
    /// How to launch one child process.
    pub command: ChildCommand,
    /// One independent parameter set per child lifetime.
    pub parameter_sets: Vec<Value>,
    /// Pool size cap. 0 means available parallelism.
    pub pool_cap: usize,
    /// Cooperative cancellation, shared with the caller.
    pub stop: StopSignal,
    /// How long to wait after a stop request before escalating to a
    /// forced kill.
    pub grace: Duration,
    /// Bounded wait of the aggregation loop.
    pub poll_interval: Duration,
}

/// A merged event forwarded to the caller during the run.
#[derive(Debug)]
pub enum FanoutEvent {
    /// Output from one parameter set. Arrival order across sets is
    /// unspecified; consumers key on `task_id`.
    Payload { task_id: usize, payload: Value },
    /// A child reported a computation failure.
    Error {
        task_id: usize,
        kind: String,
        message: String,
    },
}

/// What happened, once the run is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutSummary {
    /// Parameter sets submitted.
    pub expected: usize,
    /// Completion sentinels received.
    pub completed: usize,
    /// Payload events forwarded.
    pub payloads: usize,
    /// At least one child reported an error.
    pub failed: bool,
    /// The stop signal ended the run early.
    pub cancelled: bool,
}

/// Run the fan-out to completion, cancellation, or failure.
///
/// Forwards every merged [`FanoutEvent`] to `on_event` as it arrives.
/// Returns [`AxonError::ChildrenDied`] when the bounded wait keeps
/// timing out with no live child and missing sentinels; queue
/// inactivity alone is never treated as failure while children are
/// alive.
pub async fn run(
    spec: FanoutSpec,
    mut on_event: impl FnMut(FanoutEvent),
) -> Result<FanoutSummary, AxonError> {
    let expected = spec.parameter_sets.len();
    let mut summary = FanoutSummary {
        expected,
        completed: 0,
        payloads: 0,
        failed: false,
        cancelled: false,
    };
    if expected == 0 {
        return Ok(summary);
    }

    let parallelism = std::thread::available_parallelism().map_or(1, |n| n.get());
    let mut size = expected.min(parallelism);
    if spec.pool_cap > 0 {
        size = size.min(spec.pool_cap);
    }
    tracing::debug!("fanning out {expected} parameter sets across {size} workers");

    let (tx, mut rx) = mpsc::channel::<PartialResult>(QUEUE_DEPTH);
    let mut pool = Pool::new(spec.command, tx);
    let mut pending = spec.parameter_sets.into_iter().enumerate();

    for _ in 0..size {
        if let Some((task_id, params)) = pending.next() {
            pool.spawn(task_id, &params).await?;
        }
    }

    let mut dead_polls = 0u32;
    loop {
        if spec.stop.is_set() {
            summary.cancelled = true;
            break;
        }

        match tokio::time::timeout(spec.poll_interval, rx.recv()).await {
            Ok(Some(record)) => {
                dead_polls = 0;
                let done =
                    handle_record(record, &mut pool, &mut pending, &mut summary, &mut on_event)
                        .await?;
                if done {
                    break;
                }
            }
            // The pool keeps a sender alive, so a closed queue means
            // the pool itself is gone. Treated like an empty poll.
            Ok(None) | Err(_) => {
                if pool.alive() > 0 {
                    dead_polls = 0;
                    continue;
                }
                // Drain whatever the readers enqueued before exiting,
                // then decide whether anything is actually missing.
                let mut finished = false;
                let mut drained = false;
                while let Ok(record) = rx.try_recv() {
                    drained = true;
                    finished |=
                        handle_record(record, &mut pool, &mut pending, &mut summary, &mut on_event)
                            .await?;
                }
                if finished {
                    break;
                }
                if drained {
                    dead_polls = 0;
                    continue;
                }
                dead_polls += 1;
                if dead_polls >= DEAD_POLLS {
                    pool.shutdown(spec.grace).await;
                    return Err(AxonError::ChildrenDied {
                        expected,
                        completed: summary.completed,
                    });
                }
            }
        }
    }

    pool.shutdown(spec.grace).await;
    Ok(summary)
}

/// Apply one result record. Returns true once all sentinels arrived.
async fn handle_record(
    record: PartialResult,
    pool: &mut Pool,
    pending: &mut std::iter::Enumerate<std::vec::IntoIter<Value>>,
    summary: &mut FanoutSummary,
    on_event: &mut impl FnMut(FanoutEvent),
) -> Result<bool, AxonError> {
    match record {
        PartialResult::Payload { task_id, payload } => {
            summary.payloads += 1;
            on_event(FanoutEvent::Payload { task_id, payload });
        }
        PartialResult::Error {
            task_id,
            kind,
            message,
        } => {
            summary.failed = true;
            on_event(FanoutEvent::Error {
                task_id,
                kind,
                message,
            });
        }
        PartialResult::Done { task_id } => {
            summary.completed += 1;
            pool.reap(task_id).await;
            // One task per process lifetime: a finished slot is
            // refilled with a fresh child, never reused.
            if let Some((next_id, params)) = pending.next() {
                pool.spawn(next_id, &params).await?;
            }
        }
    }
    Ok(summary.completed >= summary.expected)
}
