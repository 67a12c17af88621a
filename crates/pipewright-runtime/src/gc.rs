//! Reference-counted slot reclamation.
//!
//! Every slot carries a pending-use counter: the number of consumers that
//! still need its data. Input slots start at their in-degree and output
//! slots at their out-degree in the slot-level graph; counters drain as
//! nodes execute. A slot whose counter reaches zero is *completed* and its
//! table can be released, optionally after being stored and flushed.
//! Transitions are
//! queued as events and drained synchronously by the run driver, so no
//! external subscriber can block or reorder scheduling decisions.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::TRACING_TARGET;
use crate::graph::{NodeId, PipelineGraph, SlotKind, SlotRef};

/// A slot lifecycle transition observed by the run driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcEvent {
    /// The slot's last pending consumer is done; its data may be released.
    SlotCompleted(SlotRef),
    /// The slot's data was persisted to durable storage.
    SlotFlushed(SlotRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    Completed,
    Flushed,
}

#[derive(Debug)]
struct GcInner {
    scores: HashMap<SlotRef, usize>,
    states: HashMap<SlotRef, SlotState>,
    /// Slot declaration order, for deterministic sweeps and reports.
    order: Vec<SlotRef>,
    /// Per node: the (source output, own input) pair of every incoming edge.
    consumed_edges: HashMap<NodeId, Vec<(SlotRef, SlotRef)>>,
    events: VecDeque<GcEvent>,
    completed: usize,
}

impl GcInner {
    fn complete(&mut self, slot: &SlotRef) {
        self.states.insert(slot.clone(), SlotState::Completed);
        self.completed += 1;
        self.events.push_back(GcEvent::SlotCompleted(slot.clone()));
    }

    fn decrement(&mut self, slot: &SlotRef) {
        if self.states.get(slot) != Some(&SlotState::Pending) {
            return;
        }
        let reached_zero = match self.scores.get_mut(slot) {
            Some(0) | None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    slot = %slot,
                    "Ignoring decrement that would drive a GC counter negative"
                );
                false
            }
            Some(score) => {
                *score -= 1;
                *score == 0
            }
        };
        if reached_zero {
            let slot = slot.clone();
            self.complete(&slot);
        }
    }
}

/// Tracks pending-use counters for every slot of one graph run.
///
/// Thread-safe: loop-group sub-runs may complete node bodies concurrently
/// with sibling subgraphs, so all transitions go through a mutex.
#[derive(Debug)]
pub struct GcHelper {
    inner: Mutex<GcInner>,
}

impl GcHelper {
    /// Initializes counters from the slot-level graph.
    ///
    /// Slots whose initial score is zero (terminal outputs, unconnected
    /// optional inputs) stay pending until [`GcHelper::mark_all_completed`]
    /// so terminal results survive long enough to be stored and flushed.
    pub fn new(graph: &PipelineGraph) -> Self {
        let mut scores = HashMap::new();
        let mut states = HashMap::new();
        let mut order = Vec::new();
        let mut consumed_edges: HashMap<NodeId, Vec<(SlotRef, SlotRef)>> = HashMap::new();

        for (id, node) in graph.nodes() {
            for def in node.slots() {
                let slot = SlotRef::new(id, def.name.clone());
                let score = match def.kind {
                    SlotKind::Input => graph.source_slots(&slot).len(),
                    SlotKind::Output => graph.target_slots(&slot).len(),
                };
                scores.insert(slot.clone(), score);
                states.insert(slot.clone(), SlotState::Pending);
                if def.kind == SlotKind::Input {
                    for source in graph.source_slots(&slot) {
                        consumed_edges
                            .entry(id)
                            .or_default()
                            .push((source, slot.clone()));
                    }
                }
                order.push(slot);
            }
        }

        Self {
            inner: Mutex::new(GcInner {
                scores,
                states,
                order,
                consumed_edges,
                events: VecDeque::new(),
                completed: 0,
            }),
        }
    }

    /// Decrements a slot's counter; completes it when the counter reaches
    /// zero. A no-op for already-completed slots.
    pub fn decrement(&self, slot: &SlotRef) {
        self.lock().decrement(slot);
    }

    /// Force-completes a slot. Idempotent; no event when already completed.
    pub fn mark_completed(&self, slot: &SlotRef) {
        let mut inner = self.lock();
        if inner.states.get(slot) == Some(&SlotState::Pending) {
            inner.complete(slot);
        }
    }

    /// Marks a slot as flushed to durable storage.
    ///
    /// Implies completion; emits `SlotFlushed` exactly once.
    pub fn mark_flushed(&self, slot: &SlotRef) {
        let mut inner = self.lock();
        match inner.states.get(slot) {
            Some(SlotState::Pending) => {
                inner.complete(slot);
                inner.states.insert(slot.clone(), SlotState::Flushed);
                inner.events.push_back(GcEvent::SlotFlushed(slot.clone()));
            }
            Some(SlotState::Completed) => {
                inner.states.insert(slot.clone(), SlotState::Flushed);
                inner.events.push_back(GcEvent::SlotFlushed(slot.clone()));
            }
            Some(SlotState::Flushed) | None => {}
        }
    }

    /// Records that a node has executed and consumed its inputs.
    ///
    /// For every incoming edge of the node, both ends lose one count: the
    /// feeding output slot served one consumer and the node's input slot
    /// received its copy. An input therefore completes exactly when its
    /// node has executed, an output when its last consumer has.
    pub fn mark_node_executed(&self, node: NodeId) {
        let mut inner = self.lock();
        let edges = inner.consumed_edges.get(&node).cloned().unwrap_or_default();
        for (source, input) in edges {
            inner.decrement(&source);
            inner.decrement(&input);
        }
    }

    /// Completes every still-pending slot; the end-of-run sweep.
    pub fn mark_all_completed(&self) {
        let mut inner = self.lock();
        let order = inner.order.clone();
        for slot in order {
            if inner.states.get(&slot) == Some(&SlotState::Pending) {
                inner.complete(&slot);
            }
        }
    }

    /// Returns whether a slot has completed (or been flushed).
    pub fn is_completed(&self, slot: &SlotRef) -> bool {
        matches!(
            self.lock().states.get(slot),
            Some(SlotState::Completed) | Some(SlotState::Flushed)
        )
    }

    /// Returns all slots still pending, in declaration order.
    pub fn incomplete_slots(&self) -> Vec<SlotRef> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter(|slot| inner.states.get(*slot) == Some(&SlotState::Pending))
            .cloned()
            .collect()
    }

    /// Removes and returns all queued transition events.
    pub fn drain_events(&self) -> Vec<GcEvent> {
        self.lock().events.drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GcInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl std::fmt::Display for GcHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        write!(f, "{}/{} slots completed", inner.completed, inner.order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    /// a -> b -> c, single slot chain.
    fn chain() -> (PipelineGraph, NodeId, NodeId, NodeId) {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(Node::builder("a").output_slot("out", "table").build());
        let b = graph.add_node(
            Node::builder("b")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .build(),
        );
        let c = graph.add_node(
            Node::builder("c")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .build(),
        );
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (c, "in")).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn test_counters_drain_as_nodes_execute() {
        let (graph, a, b, c) = chain();
        let gc = GcHelper::new(&graph);

        gc.mark_node_executed(a); // a has no inputs, nothing drains
        assert!(gc.drain_events().is_empty());

        gc.mark_node_executed(b);
        let events = gc.drain_events();
        // a.out served its only consumer, b.in received its only copy
        assert!(events.contains(&GcEvent::SlotCompleted(SlotRef::new(a, "out"))));
        assert!(events.contains(&GcEvent::SlotCompleted(SlotRef::new(b, "in"))));

        gc.mark_node_executed(c);
        let events = gc.drain_events();
        assert!(events.contains(&GcEvent::SlotCompleted(SlotRef::new(b, "out"))));
        assert!(events.contains(&GcEvent::SlotCompleted(SlotRef::new(c, "in"))));

        // c.out is terminal: pending until the final sweep.
        assert_eq!(gc.incomplete_slots(), vec![SlotRef::new(c, "out")]);
        gc.mark_all_completed();
        assert_eq!(
            gc.drain_events(),
            vec![GcEvent::SlotCompleted(SlotRef::new(c, "out"))]
        );
    }

    #[test]
    fn test_completed_fires_exactly_once() {
        let (graph, a, b, _) = chain();
        let gc = GcHelper::new(&graph);

        gc.mark_node_executed(b);
        assert_eq!(gc.drain_events().len(), 2);

        // Further decrements and marks on completed slots are no-ops.
        let slot = SlotRef::new(a, "out");
        gc.decrement(&slot);
        gc.mark_completed(&slot);
        gc.mark_node_executed(b);
        assert!(gc.drain_events().is_empty());
    }

    #[test]
    fn test_output_with_two_consumers() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(Node::builder("a").output_slot("out", "table").build());
        let b = graph.add_node(Node::builder("b").input_slot("in", "table").build());
        let c = graph.add_node(Node::builder("c").input_slot("in", "table").build());
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((a, "out"), (c, "in")).unwrap();

        let gc = GcHelper::new(&graph);
        let out = SlotRef::new(a, "out");

        gc.mark_node_executed(b);
        assert!(!gc.is_completed(&out), "one consumer still pending");

        gc.mark_node_executed(c);
        assert!(gc.is_completed(&out));
    }

    #[test]
    fn test_mark_flushed_implies_completed() {
        let (graph, _, _, c) = chain();
        let gc = GcHelper::new(&graph);
        let slot = SlotRef::new(c, "out");

        gc.mark_flushed(&slot);
        let events = gc.drain_events();
        assert_eq!(
            events,
            vec![
                GcEvent::SlotCompleted(slot.clone()),
                GcEvent::SlotFlushed(slot.clone()),
            ]
        );

        // Flushing twice emits nothing further.
        gc.mark_flushed(&slot);
        assert!(gc.drain_events().is_empty());
    }

    #[test]
    fn test_decrement_never_goes_negative() {
        let (graph, _, _, c) = chain();
        let gc = GcHelper::new(&graph);
        let terminal = SlotRef::new(c, "out");

        // Terminal output starts at zero; decrementing must not underflow
        // or complete the slot.
        gc.decrement(&terminal);
        gc.decrement(&terminal);
        assert!(!gc.is_completed(&terminal));
        assert!(gc.drain_events().is_empty());
    }

    #[test]
    fn test_display_reports_progress() {
        let (graph, _, b, _) = chain();
        let gc = GcHelper::new(&graph);
        assert_eq!(gc.to_string(), "0/6 slots completed");
        gc.mark_node_executed(b);
        assert_eq!(gc.to_string(), "2/6 slots completed");
    }
}
