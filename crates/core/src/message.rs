//! Channel message framing.
//!
//! Every event a worker relays back to a waiting caller is one of
//! these records, serialized as a single JSON object. Order within a
//! channel is append order; nothing is guaranteed across channels.

use crate::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on a job's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Lifecycle transition, with optional free-text detail.
    Status {
        state: JobState,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A chunk of result data.
    Data {
        payload: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Synthetic ping injected by the HTTP pusher on idle.
    KeepAlive { timestamp: DateTime<Utc> },
}

impl ChannelMessage {
    /// Build a status message stamped now.
    pub fn status(state: JobState, detail: Option<String>) -> Self {
        ChannelMessage::Status {
            state,
            detail,
            timestamp: Utc::now(),
        }
    }

    /// Build a data message stamped now.
    pub fn data(payload: Value, content_type: Option<String>) -> Self {
        ChannelMessage::Data {
            payload,
            content_type,
            timestamp: Utc::now(),
        }
    }

    /// Build a keep-alive stamped now.
    pub fn keep_alive() -> Self {
        ChannelMessage::KeepAlive {
            timestamp: Utc::now(),
        }
    }
}
