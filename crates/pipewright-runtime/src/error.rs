//! Run error types.

use thiserror::Error;

/// Result type for pipeline runtime operations.
pub type RunResult<T> = Result<T, RunError>;

/// Errors that can occur while validating or executing a pipeline.
///
/// The variants form the error taxonomy callers are expected to match on:
/// structural problems surface as [`RunError::Validation`] before any node
/// body is invoked, a failing node body aborts the run with
/// [`RunError::NodeExecution`], and a user-requested abort is reported as
/// [`RunError::Cancelled`] so it can be told apart from a crash.
#[derive(Debug, Error)]
pub enum RunError {
    /// The pipeline graph is structurally invalid.
    #[error("invalid pipeline: {0}")]
    Validation(String),

    /// A node body raised an error during execution.
    #[error("node '{node}' ({path}) failed: {message}")]
    NodeExecution {
        /// Display name of the failed node.
        node: String,
        /// Structural path of the node within the graph.
        path: String,
        /// Error message raised by the node body.
        message: String,
    },

    /// The run was cancelled through its progress context.
    #[error("run was cancelled")]
    Cancelled,

    /// A node requires a capability unavailable in the current process.
    #[error("node '{node}' requires an unavailable capability: {message}")]
    Environment {
        /// Display name of the affected node.
        node: String,
        /// What is missing.
        message: String,
        /// Remediation hint shown to the user.
        hint: String,
    },

    /// Disk I/O failed while writing run artifacts or flushing a slot.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Returns whether this error represents a user-requested cancellation.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }

    /// Wraps a node body error with node context.
    ///
    /// Cancellation and environment failures keep their kind; everything
    /// else becomes a [`RunError::NodeExecution`] carrying the node name and
    /// its structural path.
    pub fn into_node_failure(self, node: &str, path: &str) -> RunError {
        match self {
            RunError::Cancelled => RunError::Cancelled,
            RunError::Environment { message, hint, .. } => RunError::Environment {
                node: node.to_string(),
                message,
                hint,
            },
            other => RunError::NodeExecution {
                node: node.to_string(),
                path: path.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancellation() {
        assert!(RunError::Cancelled.is_cancellation());
        assert!(!RunError::Validation("nope".into()).is_cancellation());
    }

    #[test]
    fn test_into_node_failure_wraps_generic_errors() {
        let err = RunError::Internal("boom".into()).into_node_failure("Blur", "analysis/blur");
        match err {
            RunError::NodeExecution { node, path, message } => {
                assert_eq!(node, "Blur");
                assert_eq!(path, "analysis/blur");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_into_node_failure_keeps_cancellation() {
        let err = RunError::Cancelled.into_node_failure("Blur", "analysis/blur");
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_into_node_failure_fills_environment_node() {
        let err = RunError::Environment {
            node: String::new(),
            message: "no display".into(),
            hint: "run on a desktop session".into(),
        }
        .into_node_failure("Viewer", "viz/viewer");
        match err {
            RunError::Environment { node, hint, .. } => {
                assert_eq!(node, "Viewer");
                assert_eq!(hint, "run on a desktop session");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
