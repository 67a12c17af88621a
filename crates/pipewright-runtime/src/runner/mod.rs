//! The scheduler: run configuration, worker pool, events, and the runner.

mod config;
mod events;
mod pool;
#[allow(clippy::module_inception)]
mod runner;

pub use config::{RunConfig, RunConfigBuilder};
pub use events::{RunErrorKind, RunEvent};
pub use pool::WorkerPool;
pub use runner::{GraphRunner, RunnerState};
