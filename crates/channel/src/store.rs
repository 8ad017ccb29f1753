//! Store contract shared by every channel backend.

use acore::{AxonError, JobId};
use compact_str::CompactString;
use std::sync::Arc;

/// Reserved terminal blob. NUL bytes keep it unmistakable from any
/// JSON-encoded message.
pub const CLOSE_SENTINEL: &[u8] = b"\x00axon:closed\x00";

/// Derive the channel key for a job.
pub fn channel_key(id: &JobId) -> CompactString {
    let mut key = CompactString::const_new("stream:");
    key.push_str(id.as_str());
    key
}

/// One stored record: an opaque blob plus its per-key entry id.
///
/// Entry ids increase monotonically within a key starting at 1 and
/// double as the tail offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Per-key sequence number.
    pub id: u64,
    /// Opaque payload, binary safe.
    pub blob: Vec<u8>,
}

impl Entry {
    /// Whether this entry is the terminal marker.
    pub fn is_close(&self) -> bool {
        self.blob == CLOSE_SENTINEL
    }
}

/// Append-only, TTL-bounded blob log keyed by channel key.
///
/// Implementations are synchronous; callers that need to wait for new
/// data poll [`read_after`](ChannelStore::read_after) with a bounded
/// sleep in between (see [`tail`](crate::tail)).
pub trait ChannelStore: Send + Sync {
    /// Append a blob, creating the channel on first write. Refreshes
    /// the TTL and returns the new entry id. Fails with
    /// [`AxonError::Closed`] after the terminal marker.
    fn append(&self, key: &str, blob: &[u8]) -> Result<u64, AxonError>;

    /// Append the terminal marker. Idempotent.
    fn close(&self, key: &str) -> Result<(), AxonError>;

    /// Entries with id greater than `offset`, in append order, at
    /// most `limit`. Fails with [`AxonError::Expired`] when the key
    /// is absent or idle past its TTL. Never blocks.
    fn read_after(&self, key: &str, offset: u64, limit: usize) -> Result<Vec<Entry>, AxonError>;
}

/// Shared handle to a store, cloneable across tasks.
pub type SharedStore = Arc<dyn ChannelStore>;
