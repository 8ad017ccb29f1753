//! Worker-side writer. Wraps a store with message marshaling; never
//! reads.

use crate::store::{SharedStore, channel_key};
use acore::{AxonError, ChannelMessage, JobId, JobState};
use compact_str::CompactString;
use serde_json::Value;

/// Serializes status and data events onto one job's channel and
/// closes it when the worker is finished.
pub struct Producer {
    store: SharedStore,
    key: CompactString,
}

impl Producer {
    /// Writer for the given job's channel.
    pub fn new(store: SharedStore, id: &JobId) -> Self {
        Self {
            store,
            key: channel_key(id),
        }
    }

    /// The channel key this producer writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Relay a lifecycle transition.
    pub fn send_status(&self, state: JobState, detail: Option<String>) -> Result<(), AxonError> {
        self.append(&ChannelMessage::status(state, detail))
    }

    /// Relay a chunk of result data.
    pub fn send_data(&self, payload: Value, content_type: Option<String>) -> Result<(), AxonError> {
        self.append(&ChannelMessage::data(payload, content_type))
    }

    /// Append the terminal marker. Idempotent.
    pub fn close(&self) -> Result<(), AxonError> {
        self.store.close(&self.key)
    }

    fn append(&self, message: &ChannelMessage) -> Result<(), AxonError> {
        let blob = serde_json::to_vec(message)
            .map_err(|e| AxonError::Transport(format!("encode: {e}")))?;
        // One bounded retry on transport failure, then give up.
        match self.store.append(&self.key, &blob) {
            Err(AxonError::Transport(first)) => {
                tracing::warn!("append to {} failed, retrying once: {first}", self.key);
                self.store.append(&self.key, &blob).map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }
}
