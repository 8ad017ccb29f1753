//! NDJSON push adapter over a channel tail.
//!
//! Renders one job's channel as a streaming HTTP body, one JSON
//! object per line. Long scientific computations can legitimately go
//! quiet for minutes, so an idle tail synthesizes keep-alive records
//! to defeat intermediary idle-connection timeouts. Client disconnect
//! is observed as the body being dropped, which relays cancellation
//! to the job's stop signal.

use acore::{ChannelMessage, JobState, StopSignal};
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use channel::{SharedStore, TailEvent, tail};
use compact_str::CompactString;
use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};
use std::convert::Infallible;
use std::time::Duration;

/// Content type of the streaming response.
pub const NDJSON: &str = "application/x-ndjson";

/// Sets the job's stop signal if the stream is dropped before its
/// clean end — the only way that happens is the client going away.
struct DisconnectGuard {
    stop: StopSignal,
    armed: bool,
}

impl DisconnectGuard {
    fn new(stop: StopSignal) -> Self {
        Self { stop, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("client disconnected, relaying cancellation");
            self.stop.set();
        }
    }
}

/// Build the streaming response for one channel.
pub fn ndjson_response(
    channels: SharedStore,
    key: CompactString,
    from_offset: u64,
    ping_interval: Duration,
    poll_interval: Duration,
    stop: StopSignal,
) -> Response {
    let stream = push_stream(
        channels,
        key,
        from_offset,
        ping_interval,
        poll_interval,
        stop,
    );
    (
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Follow the channel and yield NDJSON lines.
///
/// Stop conditions, in priority order: the consumer dropping this
/// stream (client disconnect, handled by the guard), the terminal
/// marker, then channel expiry or a transport failure — the latter
/// surfaced as a terminal failed-status line rather than swallowed.
pub fn push_stream(
    channels: SharedStore,
    key: CompactString,
    from_offset: u64,
    ping_interval: Duration,
    poll_interval: Duration,
    stop: StopSignal,
) -> impl Stream<Item = Result<String, Infallible>> {
    async_stream::stream! {
        let mut guard = DisconnectGuard::new(stop);
        let events = tail(channels, key.clone(), from_offset, poll_interval);
        pin_mut!(events);
        loop {
            match tokio::time::timeout(ping_interval, events.next()).await {
                // Idle past the ping interval: synthesize a keep-alive.
                Err(_) => yield Ok(line(&ChannelMessage::keep_alive())),
                Ok(Some(Ok(TailEvent::Message { message, .. }))) => yield Ok(line(&message)),
                Ok(Some(Ok(TailEvent::Closed))) => {
                    guard.disarm();
                    break;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("stream for {key} ended abnormally: {e}");
                    yield Ok(line(&ChannelMessage::status(
                        JobState::Failed,
                        Some(e.to_string()),
                    )));
                    guard.disarm();
                    break;
                }
                // The tail never ends without a close marker or an
                // error; report the anomaly instead of hiding it.
                Ok(None) => {
                    yield Ok(line(&ChannelMessage::status(
                        JobState::Failed,
                        Some("stream ended without a close marker".to_owned()),
                    )));
                    guard.disarm();
                    break;
                }
            }
        }
    }
}

fn line(message: &ChannelMessage) -> String {
    let mut s = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_owned());
    s.push('\n');
    s
}
