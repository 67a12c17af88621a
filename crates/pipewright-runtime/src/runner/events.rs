//! Run events exposed to external observers.
//!
//! Events are one-way notifications over a per-runner broadcast channel;
//! no subscriber can block or redirect scheduling decisions. Slow or absent
//! subscribers simply miss events.

use strum::Display;

use crate::error::RunError;
use crate::graph::SlotRef;

/// Coarse classification of a run error, for observers that only need the
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunErrorKind {
    /// The graph failed validation.
    Validation,
    /// A node body failed.
    Execution,
    /// The run was cancelled.
    Cancellation,
    /// A required capability is unavailable.
    Environment,
    /// Disk I/O failed.
    Storage,
    /// Serialization failed.
    Serialization,
    /// Internal error.
    Internal,
}

impl From<&RunError> for RunErrorKind {
    fn from(error: &RunError) -> Self {
        match error {
            RunError::Validation(_) => RunErrorKind::Validation,
            RunError::NodeExecution { .. } => RunErrorKind::Execution,
            RunError::Cancelled => RunErrorKind::Cancellation,
            RunError::Environment { .. } => RunErrorKind::Environment,
            RunError::Io(_) => RunErrorKind::Storage,
            RunError::Serialization(_) => RunErrorKind::Serialization,
            RunError::Internal(_) => RunErrorKind::Internal,
        }
    }
}

/// Notification emitted by a runner.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The run started.
    Started,
    /// The run finished successfully.
    Finished,
    /// The run aborted with an error or cancellation.
    Interrupted {
        /// Kind of the terminating error.
        kind: RunErrorKind,
        /// Rendered error message.
        message: String,
    },
    /// A slot's last pending consumer is done.
    SlotCompleted(SlotRef),
    /// A slot's data was persisted to durable storage.
    SlotFlushed(SlotRef),
    /// Traversal progress changed.
    StatusUpdated {
        /// Current progress value.
        progress: usize,
        /// Maximum progress value.
        max: usize,
        /// Human-readable description of the current step.
        message: String,
    },
}
