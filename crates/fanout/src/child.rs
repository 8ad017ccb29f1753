//! Child-side runtime for fan-out workers.
//!
//! A worker process reads its single task as one JSON line on stdin,
//! streams [`PartialResult`] lines on stdout, and always finishes
//! with its completion sentinel, failure included. A later `stop`
//! line on stdin sets the worker's stop signal; the computation is
//! expected to check it at safe points (top of each iteration,
//! around blocking calls) and wind down cleanly.

use acore::{PartialResult, StopSignal};
use anyhow::{Context, Result};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;

/// The single task handed to one worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildTask {
    /// Index of the parameter set within the fan-out.
    pub task_id: usize,
    /// The parameter set itself, opaque to the executor.
    pub params: Value,
}

/// Stdout writer for result records. One JSON line per record,
/// flushed immediately so the parent sees data as it is produced.
#[derive(Clone)]
pub struct ChildSink {
    task_id: usize,
}

impl ChildSink {
    /// Emit a chunk of computed output.
    pub fn payload(&self, payload: Value) {
        self.emit(&PartialResult::Payload {
            task_id: self.task_id,
            payload,
        });
    }

    /// Emit a structured failure record.
    pub fn error(&self, kind: impl Into<String>, message: impl std::fmt::Display) {
        self.emit(&PartialResult::Error {
            task_id: self.task_id,
            kind: kind.into(),
            message: message.to_string(),
        });
    }

    fn done(&self) {
        self.emit(&PartialResult::Done {
            task_id: self.task_id,
        });
    }

    fn emit(&self, record: &PartialResult) {
        let mut out = std::io::stdout().lock();
        // A worker that cannot reach its own stdout has nothing left
        // to report to; the parent will see the pipe close.
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    }
}

/// Run one worker process to completion.
///
/// Reads the task, wires up the stop watcher, runs `work`, and emits
/// the sentinel on every path out, a caught panic included. Only an
/// abort can suppress the sentinel, which the parent detects through
/// its liveness polling.
pub async fn run_child<F, Fut>(work: F) -> Result<()>
where
    F: FnOnce(ChildTask, ChildSink, StopSignal) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    use tokio::io::AsyncBufReadExt;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let first = lines
        .next_line()
        .await
        .context("read task line")?
        .context("stdin closed before a task arrived")?;
    let task: ChildTask = serde_json::from_str(&first).context("decode task line")?;

    let stop = StopSignal::new();
    let watcher_stop = stop.clone();
    let watcher = tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "stop" {
                watcher_stop.set();
                break;
            }
        }
    });

    let sink = ChildSink {
        task_id: task.task_id,
    };
    let task_id = task.task_id;

    let outcome = std::panic::AssertUnwindSafe(work(task, sink.clone(), stop))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("worker {task_id} failed: {e:#}");
            sink.error("computation", format!("{e:#}"));
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            sink.error("panic", msg);
        }
    }

    sink.done();
    watcher.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_line_roundtrip() {
        let task = ChildTask {
            task_id: 7,
            params: serde_json::json!({"amplitude": 0.4}),
        };
        let line = serde_json::to_string(&task).unwrap();
        let back: ChildTask = serde_json::from_str(&line).unwrap();
        assert_eq!(back.task_id, 7);
        assert_eq!(back.params["amplitude"], 0.4);
    }
}
