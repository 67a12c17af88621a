//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use pipewright_runtime::prelude::*;
//! ```

pub use crate::cache::{CacheStats, CacheStore};
pub use crate::data::{DataRow, DataTable};
pub use crate::error::{RunError, RunResult};
pub use crate::gc::{GcEvent, GcHelper};
pub use crate::graph::{
    Edge, IterationMode, LoopRole, Node, NodeId, PipelineDefinition, PipelineGraph, SlotDef,
    SlotKind, SlotRef,
};
pub use crate::loops::{LoopGroup, extract_loop_groups};
pub use crate::node::{NodeBody, NodeContext, NodeRegistry, PassThroughBody, RowGenerator};
pub use crate::progress::ProgressInfo;
pub use crate::runner::{GraphRunner, RunConfig, RunErrorKind, RunEvent, RunnerState, WorkerPool};
