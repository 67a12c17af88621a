//! Hierarchical progress and cancellation contexts.
//!
//! A [`ProgressInfo`] is a cheap handle over shared run state: a cancellation
//! flag, a progress counter pair, and an append-only log buffer. Children are
//! derived by [`ProgressInfo::resolve`], which extends the label path without
//! copying the shared state, so cancelling any handle cancels the whole tree.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::TRACING_TARGET;

/// Shared state behind a tree of progress handles.
#[derive(Debug, Default)]
struct ProgressShared {
    cancelled: AtomicBool,
    progress: AtomicUsize,
    max_progress: AtomicUsize,
    log: Mutex<String>,
}

/// A progress/cancellation handle for one run (or sub-run) of the scheduler.
///
/// Handles are cloneable and thread-safe; log appends and counter updates may
/// come from nested runs reporting into a shared parent context.
#[derive(Debug, Clone, Default)]
pub struct ProgressInfo {
    shared: Arc<ProgressShared>,
    /// Cancellation root. Detached contexts keep pointing at this while
    /// getting fresh counters and a fresh log.
    cancel_root: Option<Arc<ProgressShared>>,
    path: String,
}

impl ProgressInfo {
    /// Creates a root progress context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child context sharing all state, with `label` appended to
    /// the path.
    pub fn resolve(&self, label: impl AsRef<str>) -> ProgressInfo {
        let path = if self.path.is_empty() {
            label.as_ref().to_string()
        } else {
            format!("{}/{}", self.path, label.as_ref())
        };
        ProgressInfo {
            shared: Arc::clone(&self.shared),
            cancel_root: self.cancel_root.clone(),
            path,
        }
    }

    /// Derives a child context and logs an empty marker line for it.
    pub fn resolve_and_log(&self, label: impl AsRef<str>) -> ProgressInfo {
        let child = self.resolve(label);
        child.log("");
        child
    }

    /// Detaches a context for a nested run: fresh counters and log, shared
    /// cancellation.
    pub fn detach(&self) -> ProgressInfo {
        let root = self
            .cancel_root
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.shared));
        ProgressInfo {
            shared: Arc::new(ProgressShared::default()),
            cancel_root: Some(root),
            path: self.path.clone(),
        }
    }

    /// Appends a message to the run log, prefixed with this handle's path.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = if self.path.is_empty() {
            message.to_string()
        } else if message.is_empty() {
            self.path.clone()
        } else {
            format!("{}: {}", self.path, message)
        };
        tracing::debug!(target: TRACING_TARGET, "{line}");
        if let Ok(mut log) = self.shared.log.lock() {
            log.push_str(&line);
            log.push('\n');
        }
    }

    /// Requests cancellation of the whole context tree.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        if let Some(root) = &self.cancel_root {
            root.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
            || self
                .cancel_root
                .as_ref()
                .is_some_and(|root| root.cancelled.load(Ordering::SeqCst))
    }

    /// Sets the current progress value.
    pub fn set_progress(&self, progress: usize) {
        self.shared.progress.store(progress, Ordering::SeqCst);
    }

    /// Sets the maximum progress value.
    pub fn set_max_progress(&self, max: usize) {
        self.shared.max_progress.store(max, Ordering::SeqCst);
    }

    /// Increments the current progress value by one.
    pub fn increment_progress(&self) {
        self.shared.progress.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the current progress value.
    pub fn progress(&self) -> usize {
        self.shared.progress.load(Ordering::SeqCst)
    }

    /// Returns the maximum progress value.
    pub fn max_progress(&self) -> usize {
        self.shared.max_progress.load(Ordering::SeqCst)
    }

    /// Returns the label path of this handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a copy of the accumulated log.
    pub fn snapshot_log(&self) -> String {
        self.shared
            .log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Clears the accumulated log.
    pub fn clear_log(&self) {
        if let Ok(mut log) = self.shared.log.lock() {
            log.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_builds_path() {
        let root = ProgressInfo::new();
        let child = root.resolve("Segmentation").resolve("Threshold");
        assert_eq!(child.path(), "Segmentation/Threshold");
    }

    #[test]
    fn test_resolve_shares_cancellation() {
        let root = ProgressInfo::new();
        let child = root.resolve("A").resolve("B");
        child.cancel();
        assert!(root.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_detach_shares_only_cancellation() {
        let root = ProgressInfo::new();
        root.set_progress(5);
        root.log("outer line");

        let detached = root.detach();
        assert_eq!(detached.progress(), 0);
        assert!(detached.snapshot_log().is_empty());

        // Cancellation still reaches the detached context, in both directions.
        root.cancel();
        assert!(detached.is_cancelled());
    }

    #[test]
    fn test_detach_cancel_propagates_to_root() {
        let root = ProgressInfo::new();
        let detached = root.resolve("Loop").detach();
        detached.cancel();
        assert!(root.is_cancelled());
    }

    #[test]
    fn test_log_prefixes_path() {
        let root = ProgressInfo::new();
        root.resolve("GC").log("status ok");
        root.log("top level");
        let log = root.snapshot_log();
        assert!(log.contains("GC: status ok"));
        assert!(log.contains("top level"));
    }

    #[test]
    fn test_counters() {
        let progress = ProgressInfo::new();
        progress.set_max_progress(10);
        progress.set_progress(3);
        progress.increment_progress();
        assert_eq!(progress.progress(), 4);
        assert_eq!(progress.max_progress(), 10);
    }
}
