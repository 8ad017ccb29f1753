//! SQLite-backed channel store.
//!
//! The durable backend. All SQL lives in `sql/*.sql` files, loaded
//! via `include_str!`. The connection sits behind a `Mutex`; every
//! operation is a short transaction-free statement batch, so the
//! store's own write latency bounds `append`.

use crate::store::{CLOSE_SENTINEL, ChannelStore, Entry};
use acore::AxonError;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SQL_SCHEMA: &str = include_str!("../sql/schema.sql");
const SQL_TOUCH: &str = include_str!("../sql/touch.sql");
const SQL_SELECT_CHANNEL: &str = include_str!("../sql/select_channel.sql");
const SQL_NEXT_SEQ: &str = include_str!("../sql/next_seq.sql");
const SQL_INSERT_ENTRY: &str = include_str!("../sql/insert_entry.sql");
const SQL_SELECT_AFTER: &str = include_str!("../sql/select_after.sql");
const SQL_MARK_CLOSED: &str = include_str!("../sql/mark_closed.sql");
const SQL_PURGE_ENTRIES: &str = include_str!("../sql/purge_expired_entries.sql");
const SQL_PURGE_CHANNELS: &str = include_str!("../sql/purge_expired_channels.sql");

/// Durable channel store on a single SQLite database.
pub struct SqliteChannelStore {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteChannelStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, AxonError> {
        let conn = Connection::open(path).map_err(transport)?;
        Self::init(conn, ttl)
    }

    /// In-memory database, useful for testing.
    pub fn in_memory(ttl: Duration) -> Result<Self, AxonError> {
        let conn = Connection::open_in_memory().map_err(transport)?;
        Self::init(conn, ttl)
    }

    fn init(conn: Connection, ttl: Duration) -> Result<Self, AxonError> {
        conn.execute_batch(SQL_SCHEMA).map_err(transport)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn expires_at(&self) -> i64 {
        now_unix() + self.ttl.as_secs() as i64
    }

    /// Channel status: `None` if absent, otherwise (expired, closed).
    fn channel_status(conn: &Connection, key: &str) -> Result<Option<(bool, bool)>, AxonError> {
        let row: Option<(i64, i64)> = conn
            .query_row(SQL_SELECT_CHANNEL, [key], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(transport)?;
        Ok(row.map(|(expires_at, closed)| (expires_at <= now_unix(), closed != 0)))
    }

    fn push(&self, key: &str, blob: &[u8], closing: bool) -> Result<u64, AxonError> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        conn.execute(SQL_PURGE_ENTRIES, [now]).map_err(transport)?;
        conn.execute(SQL_PURGE_CHANNELS, [now]).map_err(transport)?;

        if let Some((_, closed)) = Self::channel_status(&conn, key)? {
            if closed {
                if closing {
                    return Ok(0);
                }
                return Err(AxonError::Closed);
            }
        }

        let seq: i64 = conn
            .query_row(SQL_NEXT_SEQ, [key], |row| row.get(0))
            .map_err(transport)?;
        conn.execute(SQL_INSERT_ENTRY, params![key, seq, blob])
            .map_err(transport)?;
        conn.execute(SQL_TOUCH, params![key, self.expires_at()])
            .map_err(transport)?;
        if closing {
            conn.execute(SQL_MARK_CLOSED, params![key, self.expires_at()])
                .map_err(transport)?;
        }
        Ok(seq as u64)
    }
}

impl ChannelStore for SqliteChannelStore {
    fn append(&self, key: &str, blob: &[u8]) -> Result<u64, AxonError> {
        self.push(key, blob, false)
    }

    fn close(&self, key: &str) -> Result<(), AxonError> {
        self.push(key, CLOSE_SENTINEL, true)?;
        Ok(())
    }

    fn read_after(&self, key: &str, offset: u64, limit: usize) -> Result<Vec<Entry>, AxonError> {
        let conn = self.conn.lock().unwrap();
        match Self::channel_status(&conn, key)? {
            Some((false, _)) => {}
            _ => return Err(AxonError::Expired(key.to_owned())),
        }

        let mut stmt = conn.prepare_cached(SQL_SELECT_AFTER).map_err(transport)?;
        let rows = stmt
            .query_map(params![key, offset as i64, limit as i64], |row| {
                Ok(Entry {
                    id: row.get::<_, i64>(0)? as u64,
                    blob: row.get(1)?,
                })
            })
            .map_err(transport)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(transport)
    }
}

fn transport(e: rusqlite::Error) -> AxonError {
    AxonError::Transport(e.to_string())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
