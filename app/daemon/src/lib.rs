//! axond — the HTTP boundary over the simulation job service.
//!
//! Wires the durable channel, the job queue, and the fan-out executor
//! behind a small axum gateway: submit a job, poll its record, or
//! follow its channel as a newline-delimited JSON stream.

pub use config::{DaemonConfig, global_config_dir, scaffold_config_dir};
pub use gateway::serve::{ServeHandle, serve, serve_with_config};

pub mod config;
pub mod gateway;
pub mod handlers;
pub mod sim;
