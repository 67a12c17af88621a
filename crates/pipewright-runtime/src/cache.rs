//! Fingerprint-keyed result cache.
//!
//! Entries are keyed by (node identity, state fingerprint, output slot
//! name) and hold snapshot copies of data tables taken when the producing
//! node finished. Entries are independent of the live graph: deleting or
//! reconfiguring a node never mutates stored data, but a changed
//! configuration yields a different fingerprint and therefore a miss.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::TRACING_TARGET;
use crate::data::DataTable;
use crate::error::RunResult;
use crate::graph::{NodeId, PipelineGraph};
use crate::progress::ProgressInfo;

/// Aggregate cache statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of cached rows across all entries.
    pub cached_rows: usize,
    /// Cached rows per data type.
    pub rows_per_type: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct CacheInner {
    /// node -> state fingerprint -> slot name -> table snapshot.
    entries: HashMap<NodeId, HashMap<String, HashMap<String, DataTable>>>,
    stats: CacheStats,
}

impl CacheInner {
    fn account_add(&mut self, table: &DataTable) {
        self.stats.cached_rows += table.len();
        *self
            .stats
            .rows_per_type
            .entry(table.data_type.clone())
            .or_default() += table.len();
    }

    fn account_remove(&mut self, table: &DataTable) {
        self.stats.cached_rows = self.stats.cached_rows.saturating_sub(table.len());
        if let Some(count) = self.stats.rows_per_type.get_mut(&table.data_type) {
            *count = count.saturating_sub(table.len());
            if *count == 0 {
                self.stats.rows_per_type.remove(&table.data_type);
            }
        }
    }

    fn remove_state(&mut self, node: NodeId, state: &str) {
        let mut emptied = false;
        if let Some(states) = self.entries.get_mut(&node) {
            if let Some(slots) = states.remove(state) {
                for table in slots.values() {
                    self.stats.cached_rows = self.stats.cached_rows.saturating_sub(table.len());
                    if let Some(count) = self.stats.rows_per_type.get_mut(&table.data_type) {
                        *count = count.saturating_sub(table.len());
                        if *count == 0 {
                            self.stats.rows_per_type.remove(&table.data_type);
                        }
                    }
                }
            }
            emptied = states.is_empty();
        }
        if emptied {
            self.entries.remove(&node);
        }
    }
}

/// Keyed store of previously produced slot tables.
///
/// Interior mutability behind a mutex gives the single-writer-at-a-time
/// discipline per key: a `store` is observable by subsequent lookups only
/// after it returns. Shared across runs via `Arc`; lookups are always by
/// exact fingerprint, never "closest" or "latest".
#[derive(Debug, Default)]
pub struct CacheStore {
    inner: Mutex<CacheInner>,
}

impl CacheStore {
    /// Creates an empty cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a table snapshot, overwriting any prior entry for the key.
    pub fn store(
        &self,
        node: NodeId,
        state: impl Into<String>,
        slot_name: impl Into<String>,
        table: DataTable,
    ) {
        let mut inner = self.lock();
        let slots = inner
            .entries
            .entry(node)
            .or_default()
            .entry(state.into())
            .or_default();
        let replaced = slots.insert(slot_name.into(), table.clone());
        if let Some(previous) = replaced {
            inner.account_remove(&previous);
        }
        inner.account_add(&table);
    }

    /// Returns all cached slots for an exact state match.
    ///
    /// The map is empty if nothing was stored for this (node, state) pair.
    pub fn query(&self, node: NodeId, state: &str) -> HashMap<String, DataTable> {
        self.lock()
            .entries
            .get(&node)
            .and_then(|states| states.get(state))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns all historical states of a node with their cached slots.
    pub fn extract(&self, node: NodeId) -> HashMap<String, HashMap<String, DataTable>> {
        self.lock().entries.get(&node).cloned().unwrap_or_default()
    }

    /// Removes all entries of a node.
    pub fn clear(&self, node: NodeId) {
        let mut inner = self.lock();
        let states: Vec<String> = inner
            .entries
            .get(&node)
            .map(|states| states.keys().cloned().collect())
            .unwrap_or_default();
        for state in states {
            inner.remove_state(node, &state);
        }
    }

    /// Removes a single (node, state) entry.
    pub fn clear_state(&self, node: NodeId, state: &str) {
        self.lock().remove_state(node, state);
    }

    /// Removes everything.
    pub fn clear_all(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
    }

    /// Removes entries invalidated by graph edits.
    ///
    /// Walks all cached node IDs and drops entries whose node no longer
    /// exists in `graph`, whose state fingerprint no longer matches the
    /// node's current one (`compare_states`), or whose cached slot set no
    /// longer matches the node's output slots (`compare_slots`). A
    /// full-state mismatch takes precedence when both comparisons are
    /// requested.
    pub fn auto_clean(
        &self,
        compare_slots: bool,
        compare_states: bool,
        graph: &PipelineGraph,
        progress: &ProgressInfo,
    ) -> RunResult<()> {
        let progress = progress.resolve("Cache");
        let cached_nodes: Vec<NodeId> = {
            let inner = self.lock();
            inner.entries.keys().copied().collect()
        };
        let fingerprints = graph.fingerprints()?;

        for node in cached_nodes {
            if !graph.contains_node(node) {
                progress.log(format!("Removing cache of vanished node {node}"));
                self.clear(node);
                continue;
            }

            let current_slots: Vec<String> = graph
                .get_node(node)
                .map(|n| n.output_slots().map(|slot| slot.name.clone()).collect())
                .unwrap_or_default();
            let current_state = fingerprints.get(&node);

            let states: Vec<(String, Vec<String>)> = {
                let inner = self.lock();
                inner
                    .entries
                    .get(&node)
                    .map(|states| {
                        states
                            .iter()
                            .map(|(state, slots)| {
                                (state.clone(), slots.keys().cloned().collect())
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            };

            for (state, mut slot_names) in states {
                // State comparison takes precedence over slot-shape
                // comparison when both are requested.
                if compare_states && current_state.is_some_and(|fp| *fp != state) {
                    progress.log(format!("Removing outdated state of node {node}"));
                    self.clear_state(node, &state);
                    continue;
                }
                if compare_slots {
                    slot_names.sort();
                    let mut expected = current_slots.clone();
                    expected.sort();
                    if slot_names != expected {
                        progress.log(format!("Removing slot-mismatched state of node {node}"));
                        self.clear_state(node, &state);
                    }
                }
            }
        }

        tracing::debug!(
            target: TRACING_TARGET,
            cached_rows = self.stats().cached_rows,
            "Cache auto-clean finished"
        );
        Ok(())
    }

    /// Returns a snapshot of the aggregate statistics.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Returns whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}
