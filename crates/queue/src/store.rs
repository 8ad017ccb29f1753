//! Durable job bookkeeping.
//!
//! One SQLite table tracks every job from dispatch to terminal state.
//! State writes are monotonic: an update that would move a job
//! backwards matches zero rows and is logged instead of applied.

use crate::dispatch::TaskDescriptor;
use acore::{AxonError, JobHandle, JobId, JobKind, JobRecord, JobState};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

const SQL_SCHEMA: &str = include_str!("../sql/schema.sql");
const SQL_INSERT: &str = include_str!("../sql/insert_job.sql");
const SQL_SELECT: &str = include_str!("../sql/select_job.sql");
const SQL_SELECT_QUEUED: &str = include_str!("../sql/select_queued.sql");
const SQL_MARK_RUNNING: &str = include_str!("../sql/mark_running.sql");
const SQL_MARK_FINISHED: &str = include_str!("../sql/mark_finished.sql");
const SQL_QUEUE_POSITION: &str = include_str!("../sql/queue_position.sql");

/// SQLite-backed job table shared by the dispatcher, the runner, and
/// polling callers.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AxonError> {
        let conn = Connection::open(path).map_err(transport)?;
        Self::init(conn)
    }

    /// In-memory database, useful for testing.
    pub fn in_memory() -> Result<Self, AxonError> {
        let conn = Connection::open_in_memory().map_err(transport)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, AxonError> {
        conn.execute_batch(SQL_SCHEMA).map_err(transport)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a freshly dispatched job as queued, at the tail of the
    /// queue order.
    pub fn insert(&self, handle: &JobHandle, args: &Value) -> Result<(), AxonError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            SQL_INSERT,
            params![
                handle.id.as_str(),
                handle.kind.as_str(),
                args.to_string(),
                handle.submitted_at.timestamp(),
            ],
        )
        .map_err(transport)?;
        Ok(())
    }

    /// The polling caller's view, `None` for an unknown id.
    /// `queue_position` is populated only while the job is queued.
    pub fn get(&self, id: &JobId) -> Result<Option<JobRecord>, AxonError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(SQL_SELECT, [id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                ))
            })
            .optional()
            .map_err(transport)?;

        let Some((id, kind, status, error, created, started, ended)) = row else {
            return Ok(None);
        };
        let id = JobId::from_string(id);
        let status = parse_state(&status)?;
        let queue_position = if status == JobState::Queued {
            Self::position(&conn, &id)?
        } else {
            None
        };
        Ok(Some(JobRecord {
            id,
            kind: parse_kind(&kind)?,
            status,
            queue_position,
            error,
            created_at: from_unix(created)?,
            started_at: started.map(from_unix).transpose()?,
            ended_at: ended.map(from_unix).transpose()?,
        }))
    }

    /// Jobs still queued, in queue order. Used by the runner to pick
    /// up work left over from a previous process.
    pub fn pending(&self) -> Result<Vec<TaskDescriptor>, AxonError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(SQL_SELECT_QUEUED).map_err(transport)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(transport)?;

        let mut descriptors = Vec::new();
        for row in rows {
            let (id, kind, args) = row.map_err(transport)?;
            descriptors.push(TaskDescriptor {
                id: JobId::from_string(id),
                kind: parse_kind(&kind)?,
                args: serde_json::from_str(&args)
                    .map_err(|e| AxonError::Transport(format!("corrupt args: {e}")))?,
            });
        }
        Ok(descriptors)
    }

    /// Move a queued job to running. Returns false (and logs) when the
    /// job is not in the queued state, so regressions never land.
    pub fn mark_running(&self, id: &JobId) -> Result<bool, AxonError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(SQL_MARK_RUNNING, params![id.as_str(), Utc::now().timestamp()])
            .map_err(transport)?;
        if changed == 0 {
            tracing::warn!("ignoring running transition for job {id}, not queued");
        }
        Ok(changed > 0)
    }

    /// Move a job to its terminal state. Returns false (and logs) when
    /// the job already finished.
    pub fn mark_finished(
        &self,
        id: &JobId,
        ok: bool,
        error: Option<&str>,
    ) -> Result<bool, AxonError> {
        let status = if ok {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                SQL_MARK_FINISHED,
                params![id.as_str(), status.to_string(), error, Utc::now().timestamp()],
            )
            .map_err(transport)?;
        if changed == 0 {
            tracing::warn!("ignoring terminal transition for job {id}, already finished");
        }
        Ok(changed > 0)
    }

    /// Queued jobs ahead of this one, `None` once it left the queue.
    pub fn queue_position(&self, id: &JobId) -> Result<Option<u32>, AxonError> {
        Ok(self.get(id)?.and_then(|record| record.queue_position))
    }

    fn position(conn: &Connection, id: &JobId) -> Result<Option<u32>, AxonError> {
        conn.query_row(SQL_QUEUE_POSITION, [id.as_str()], |row| row.get::<_, u32>(0))
            .optional()
            .map_err(transport)
    }
}

fn parse_kind(s: &str) -> Result<JobKind, AxonError> {
    JobKind::parse(s).ok_or_else(|| AxonError::Transport(format!("corrupt job kind: {s}")))
}

fn parse_state(s: &str) -> Result<JobState, AxonError> {
    match s {
        "queued" => Ok(JobState::Queued),
        "running" => Ok(JobState::Running),
        "succeeded" => Ok(JobState::Succeeded),
        "failed" => Ok(JobState::Failed),
        other => Err(AxonError::Transport(format!("corrupt job status: {other}"))),
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, AxonError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AxonError::Transport(format!("corrupt timestamp: {secs}")))
}

fn transport(e: rusqlite::Error) -> AxonError {
    AxonError::Transport(e.to_string())
}
