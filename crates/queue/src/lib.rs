//! Job dispatch and lifecycle bookkeeping.
//!
//! The [`Dispatcher`] is the boundary that decouples "accepted" from
//! "completed": it persists a job record, opens the job's channel,
//! and hands a task descriptor to the [`Runner`], returning before
//! anything executes. Polling callers watch the record through
//! [`monitor`]; streaming callers follow the channel directly.

pub use dispatch::{Dispatcher, TaskDescriptor};
pub use monitor::{MonitorCallbacks, monitor};
pub use registry::{Handler, JobContext, Registry};
pub use runner::{Runner, RunnerHandle};
pub use stops::StopMap;
pub use store::JobStore;

mod dispatch;
mod monitor;
mod registry;
mod runner;
mod stops;
mod store;
