//! Core types for the axon simulation job service.
//!
//! Everything shared across the channel, queue, and fan-out crates
//! lives here: job identity and lifecycle, channel message framing,
//! fan-out result records, the error taxonomy, and configuration.

pub use config::AxonConfig;
pub use error::AxonError;
pub use job::{JobHandle, JobId, JobKind, JobRecord, JobState};
pub use message::ChannelMessage;
pub use result::PartialResult;
pub use stop::StopSignal;

mod config;
mod error;
mod job;
mod message;
mod result;
mod stop;
