//! Consumer-side tail stream.
//!
//! Follows a channel from an offset with a bounded poll: drain what
//! is there, sleep a short interval, re-check. The bounded wait is
//! the liveness mechanism that lets the caller observe disconnects
//! and timeouts between polls; there is deliberately no single
//! unbounded blocking read anywhere on this path.

use crate::store::SharedStore;
use acore::{AxonError, ChannelMessage};
use compact_str::CompactString;
use futures_core::Stream;
use std::time::Duration;

/// Entries read per poll.
const BATCH: usize = 64;

/// One tail observation.
#[derive(Debug)]
pub enum TailEvent {
    /// A regular message, with its entry id (the next resume offset).
    Message { id: u64, message: ChannelMessage },
    /// The terminal marker. Always the last event of a clean stream.
    Closed,
}

/// Follow `key` from `from_offset`, yielding decoded messages until
/// the terminal marker, expiry, or an unrecoverable transport error.
///
/// The stream is lazy and restartable: the `id` of the last observed
/// message is a valid `from_offset` for a successor stream.
pub fn tail(
    store: SharedStore,
    key: CompactString,
    from_offset: u64,
    poll_interval: Duration,
) -> impl Stream<Item = Result<TailEvent, AxonError>> {
    async_stream::stream! {
        let mut offset = from_offset;
        let mut transport_strikes = 0u8;
        loop {
            let batch = match store.read_after(&key, offset, BATCH) {
                Ok(batch) => batch,
                Err(AxonError::Transport(msg)) if transport_strikes == 0 => {
                    // Retryable exactly once, after a bounded pause.
                    tracing::warn!("tail of {key} hit transport error, retrying once: {msg}");
                    transport_strikes = 1;
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            transport_strikes = 0;

            if batch.is_empty() {
                // Bounded block, then return control so the caller can
                // check for disconnects or deadlines.
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            for entry in batch {
                if entry.is_close() {
                    yield Ok(TailEvent::Closed);
                    return;
                }
                offset = entry.id;
                match serde_json::from_slice::<ChannelMessage>(&entry.blob) {
                    Ok(message) => yield Ok(TailEvent::Message { id: entry.id, message }),
                    Err(e) => {
                        yield Err(AxonError::Transport(format!(
                            "undecodable entry {} on {key}: {e}",
                            entry.id
                        )));
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryChannelStore, Producer, channel_key};
    use acore::{JobId, JobState};
    use futures_util::{StreamExt, pin_mut};
    use std::sync::Arc;

    fn store() -> SharedStore {
        Arc::new(MemoryChannelStore::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn yields_messages_then_closed() {
        let store = store();
        let id = JobId::new();
        let producer = Producer::new(store.clone(), &id);
        producer.send_status(JobState::Running, None).unwrap();
        producer.send_data(serde_json::json!(1), None).unwrap();
        producer.close().unwrap();

        let s = tail(store, channel_key(&id), 0, Duration::from_millis(5));
        pin_mut!(s);

        let mut kinds = Vec::new();
        while let Some(event) = s.next().await {
            match event.unwrap() {
                TailEvent::Message { message, .. } => kinds.push(match message {
                    ChannelMessage::Status { .. } => "status",
                    ChannelMessage::Data { .. } => "data",
                    ChannelMessage::KeepAlive { .. } => "keep_alive",
                }),
                TailEvent::Closed => kinds.push("closed"),
            }
        }
        assert_eq!(kinds, ["status", "data", "closed"]);
    }

    #[tokio::test]
    async fn nothing_after_close_marker() {
        let store = store();
        let id = JobId::new();
        let producer = Producer::new(store.clone(), &id);
        producer.send_data(serde_json::json!("x"), None).unwrap();
        producer.close().unwrap();

        let s = tail(store, channel_key(&id), 0, Duration::from_millis(5));
        pin_mut!(s);
        let mut events = 0;
        while s.next().await.is_some() {
            events += 1;
        }
        // One data message plus the close event, stream then ends.
        assert_eq!(events, 2);
    }

    #[tokio::test]
    async fn restart_from_offset_skips_seen() {
        let store = store();
        let id = JobId::new();
        let producer = Producer::new(store.clone(), &id);
        for i in 0..3 {
            producer.send_data(serde_json::json!(i), None).unwrap();
        }
        producer.close().unwrap();

        let s = tail(store, channel_key(&id), 2, Duration::from_millis(5));
        pin_mut!(s);
        let first = s.next().await.unwrap().unwrap();
        match first {
            TailEvent::Message { id, message } => {
                assert_eq!(id, 3);
                assert!(matches!(message, ChannelMessage::Data { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_channel_errors_out() {
        let s = tail(
            store(),
            CompactString::const_new("stream:ghost"),
            0,
            Duration::from_millis(5),
        );
        pin_mut!(s);
        let first = s.next().await.unwrap();
        assert!(matches!(first, Err(AxonError::Expired(_))));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn waits_for_late_writer() {
        let store = store();
        let id = JobId::new();
        let key = channel_key(&id);
        // Channel must exist before the tail starts or the stream
        // reports it expired.
        store.append(&key, br#"{"type":"keep_alive","timestamp":"2026-01-01T00:00:00Z"}"#).unwrap();

        let writer_store = store.clone();
        let writer_id = id.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let producer = Producer::new(writer_store, &writer_id);
            producer.send_data(serde_json::json!("late"), None).unwrap();
            producer.close().unwrap();
        });

        let s = tail(store, key, 1, Duration::from_millis(5));
        pin_mut!(s);
        let first = s.next().await.unwrap().unwrap();
        assert!(matches!(first, TailEvent::Message { .. }));
        let second = s.next().await.unwrap().unwrap();
        assert!(matches!(second, TailEvent::Closed));
        writer.await.unwrap();
    }
}
