//! Run configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use derive_builder::Builder;

use crate::graph::NodeId;

/// Configuration for one scheduler run.
///
/// These settings are consumed, not owned, by the runner; they are
/// typically loaded by configuration-parsing code outside this crate.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RunConfig {
    /// Directory for run artifacts (log, project copy, flushed slots).
    #[builder(setter(strip_option), default)]
    pub output_path: Option<PathBuf>,

    /// Size of the shared worker pool node bodies run on.
    #[builder(default = "1")]
    pub num_threads: usize,

    /// Whether to resume nodes from the cache store.
    #[builder(default = "true")]
    pub load_from_cache: bool,

    /// Whether to store produced outputs into the cache store.
    #[builder(default = "true")]
    pub store_to_cache: bool,

    /// Whether to flush output slots to durable storage.
    #[builder(default = "false")]
    pub save_to_disk: bool,

    /// Per-node opt-out from cache loading and storing.
    #[builder(default)]
    pub disable_cache_nodes: HashSet<NodeId>,

    /// Per-node opt-out from disk flushing.
    #[builder(default)]
    pub disable_disk_nodes: HashSet<NodeId>,

    /// Nodes whose inputs are provided from outside the run; they are never
    /// deactivated for missing sources. Used by loop sub-runs.
    #[builder(default)]
    pub externally_satisfied: HashSet<NodeId>,

    /// Nodes whose completed output tables are kept in memory instead of
    /// being released, so callers can read them after the run.
    #[builder(default)]
    pub persistent_nodes: HashSet<NodeId>,

    /// Whether nodes with unconnected required inputs are silently skipped
    /// instead of failing validation.
    #[builder(default = "true")]
    pub allow_missing_inputs: bool,
}

impl RunConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(threads) = self.num_threads {
            if threads == 0 {
                return Err("num_threads must be at least 1".into());
            }
        }
        Ok(())
    }
}

impl RunConfig {
    /// Returns a builder for a run configuration.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            num_threads: 1,
            load_from_cache: true,
            store_to_cache: true,
            save_to_disk: false,
            disable_cache_nodes: HashSet::new(),
            disable_disk_nodes: HashSet::new(),
            externally_satisfied: HashSet::new(),
            persistent_nodes: HashSet::new(),
            allow_missing_inputs: true,
        }
    }
}
