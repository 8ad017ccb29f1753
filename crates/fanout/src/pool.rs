//! Child process pool: spawning, liveness, and teardown.

use acore::{AxonError, PartialResult};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How to launch one worker process.
///
/// The daemon points this at its own binary with the hidden child
/// entrypoint; tests point it at small shell scripts. The task id is
/// appended as the final argument.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments before the appended task id.
    pub args: Vec<String>,
}

/// One live worker.
struct Slot {
    task_id: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: JoinHandle<()>,
}

/// The set of live children plus the shared result queue sender.
pub(crate) struct Pool {
    command: ChildCommand,
    tx: mpsc::Sender<PartialResult>,
    slots: Vec<Slot>,
}

impl Pool {
    pub(crate) fn new(command: ChildCommand, tx: mpsc::Sender<PartialResult>) -> Self {
        Self {
            command,
            tx,
            slots: Vec::new(),
        }
    }

    /// Launch a fresh child for one parameter set. The set goes in as
    /// a single JSON line on stdin; result records come back as JSON
    /// lines on stdout, forwarded into the shared queue by a reader
    /// task.
    pub(crate) async fn spawn(&mut self, task_id: usize, params: &Value) -> Result<(), AxonError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(task_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AxonError::Transport(format!("spawn worker: {e}")))?;

        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take();

        if let Some(pipe) = stdin.as_mut() {
            let task = super::ChildTask {
                task_id,
                params: params.clone(),
            };
            let mut line = serde_json::to_string(&task)
                .map_err(|e| AxonError::Transport(format!("encode task: {e}")))?;
            line.push('\n');
            pipe.write_all(line.as_bytes())
                .await
                .map_err(|e| AxonError::Transport(format!("hand off task {task_id}: {e}")))?;
        }

        let tx = self.tx.clone();
        let reader = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<PartialResult>(&line) {
                    Ok(record) => {
                        if tx.send(record).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("worker {task_id} wrote an unparseable line: {e}"),
                }
            }
        });

        tracing::debug!("spawned worker for parameter set {task_id}");
        self.slots.push(Slot {
            task_id,
            child,
            stdin,
            reader,
        });
        Ok(())
    }

    /// Children that have not exited yet.
    pub(crate) fn alive(&mut self) -> usize {
        self.slots
            .iter_mut()
            .filter(|slot| matches!(slot.child.try_wait(), Ok(None)))
            .count()
    }

    /// Join the child that completed `task_id` and drain its reader.
    /// Workers exit right after their sentinel, so this settles fast.
    pub(crate) async fn reap(&mut self, task_id: usize) {
        let Some(idx) = self.slots.iter().position(|s| s.task_id == task_id) else {
            return;
        };
        let mut slot = self.slots.swap_remove(idx);
        drop(slot.stdin.take());
        if let Err(e) = slot.child.wait().await {
            tracing::warn!("waiting on worker {task_id}: {e}");
        }
        let _ = slot.reader.await;
    }

    /// Cooperative stop, a grace period, then force.
    ///
    /// Escalation order: a `stop` control line on every stdin, wait up
    /// to `grace` for clean exits, `start_kill` the rest, and a
    /// blocking `wait` on every child so nothing is left as a zombie.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        if self.slots.is_empty() {
            return;
        }

        for slot in &mut self.slots {
            if let Some(pipe) = slot.stdin.as_mut() {
                let _ = pipe.write_all(b"stop\n").await;
                let _ = pipe.flush().await;
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline && self.alive() > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        for slot in &mut self.slots {
            if matches!(slot.child.try_wait(), Ok(None)) {
                tracing::warn!("worker {} ignored stop, killing", slot.task_id);
                let _ = slot.child.start_kill();
            }
        }

        for mut slot in self.slots.drain(..) {
            drop(slot.stdin.take());
            let _ = slot.child.wait().await;
            slot.reader.abort();
            let _ = slot.reader.await;
        }
    }
}
