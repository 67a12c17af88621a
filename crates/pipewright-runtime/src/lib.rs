#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod cache;
pub mod data;
mod error;
pub mod gc;
pub mod graph;
pub mod loops;
pub mod node;
pub mod progress;
pub mod runner;

#[doc(hidden)]
pub mod prelude;

pub use error::{RunError, RunResult};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "pipewright_runtime";
