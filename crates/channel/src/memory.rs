//! In-memory channel store for tests and embedded use.

use crate::store::{CLOSE_SENTINEL, ChannelStore, Entry};
use acore::AxonError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Log {
    entries: Vec<Vec<u8>>,
    expires_at: Instant,
    closed: bool,
}

/// Mutex-guarded map of per-key logs with the same TTL semantics as
/// the SQLite backend.
pub struct MemoryChannelStore {
    logs: Mutex<HashMap<String, Log>>,
    ttl: Duration,
}

impl MemoryChannelStore {
    /// Create a store whose keys expire after `ttl` of inactivity.
    pub fn new(ttl: Duration) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn push(&self, key: &str, blob: &[u8], closing: bool) -> Result<u64, AxonError> {
        let mut logs = self.logs.lock().unwrap();
        // Drop whatever has gone idle past its TTL.
        let now = Instant::now();
        logs.retain(|_, log| log.expires_at > now);

        let log = logs.entry(key.to_owned()).or_insert_with(|| Log {
            entries: Vec::new(),
            expires_at: now + self.ttl,
            closed: false,
        });
        if log.closed {
            if closing {
                return Ok(log.entries.len() as u64);
            }
            return Err(AxonError::Closed);
        }
        log.entries.push(blob.to_vec());
        log.expires_at = now + self.ttl;
        log.closed = closing;
        Ok(log.entries.len() as u64)
    }
}

impl ChannelStore for MemoryChannelStore {
    fn append(&self, key: &str, blob: &[u8]) -> Result<u64, AxonError> {
        self.push(key, blob, false)
    }

    fn close(&self, key: &str) -> Result<(), AxonError> {
        self.push(key, CLOSE_SENTINEL, true)?;
        Ok(())
    }

    fn read_after(&self, key: &str, offset: u64, limit: usize) -> Result<Vec<Entry>, AxonError> {
        let logs = self.logs.lock().unwrap();
        let log = logs
            .get(key)
            .filter(|log| log.expires_at > Instant::now())
            .ok_or_else(|| AxonError::Expired(key.to_owned()))?;
        Ok(log
            .entries
            .iter()
            .enumerate()
            .skip(offset as usize)
            .take(limit)
            .map(|(i, blob)| Entry {
                id: i as u64 + 1,
                blob: blob.clone(),
            })
            .collect())
    }
}
