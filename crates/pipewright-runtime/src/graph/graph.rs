//! Pipeline graph runtime representation.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use super::definition::{NodeDefinition, PipelineDefinition, PipelineMetadata};
use super::edge::{Edge, EdgeData};
use super::node::{Node, NodeId};
use super::slot::{SlotKind, SlotRef};
use crate::error::{RunError, RunResult};
use crate::node::NodeRegistry;

/// A pipeline graph containing nodes and slot-level edges.
///
/// Internally uses petgraph's `DiGraph` at node granularity; the slot-level
/// digraph used for scheduling is derived on demand. Node insertion order is
/// preserved and serves as the stable tie-break for traversal, which keeps
/// repeated runs of an unchanged graph byte-identical in order.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    /// The underlying directed multigraph; edge weights carry slot names.
    graph: DiGraph<Node, EdgeData>,
    /// Mapping from NodeId to petgraph's NodeIndex.
    node_indices: HashMap<NodeId, NodeIndex>,
    /// Reverse mapping from NodeIndex to NodeId.
    index_to_id: HashMap<NodeIndex, NodeId>,
    /// Node ids in insertion (declaration) order.
    insertion: Vec<NodeId>,
    /// Human-readable storage path segment per node.
    alias_ids: HashMap<NodeId, String>,
    /// Pipeline metadata.
    pub metadata: PipelineMetadata,
}

impl PipelineGraph {
    /// Creates a new empty pipeline graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new pipeline graph with metadata.
    pub fn with_metadata(metadata: PipelineMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Adds a node to the graph and returns its ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        let index = self.graph.add_node(node);
        self.node_indices.insert(id, index);
        self.index_to_id.insert(index, id);
        self.insertion.push(id);
        id
    }

    /// Returns a reference to a node.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        let index = self.node_indices.get(&id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a mutable reference to a node.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let index = self.node_indices.get(&id)?;
        self.graph.node_weight_mut(*index)
    }

    /// Returns whether a node exists.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_indices.contains_key(&id)
    }

    /// Returns an iterator over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.insertion
            .iter()
            .filter_map(|id| self.get_node(*id).map(|node| (*id, node)))
    }

    /// Returns all node IDs in insertion order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.insertion
    }

    /// Connects an output slot to an input slot.
    pub fn connect(&mut self, from: impl Into<SlotRef>, to: impl Into<SlotRef>) -> RunResult<()> {
        self.add_edge(Edge::new(from, to))
    }

    /// Adds a slot-level edge.
    ///
    /// Fails if either endpoint does not exist, if the directions are wrong,
    /// or if the slot data types are incompatible.
    pub fn add_edge(&mut self, edge: Edge) -> RunResult<()> {
        let from_index = *self.node_indices.get(&edge.from.node).ok_or_else(|| {
            RunError::Validation(format!("source node {} does not exist", edge.from.node))
        })?;
        let to_index = *self.node_indices.get(&edge.to.node).ok_or_else(|| {
            RunError::Validation(format!("target node {} does not exist", edge.to.node))
        })?;

        let from_def = self
            .graph
            .node_weight(from_index)
            .and_then(|node| node.slot(&edge.from.name))
            .ok_or_else(|| {
                RunError::Validation(format!("source slot {} does not exist", edge.from))
            })?;
        let to_def = self
            .graph
            .node_weight(to_index)
            .and_then(|node| node.slot(&edge.to.name))
            .ok_or_else(|| {
                RunError::Validation(format!("target slot {} does not exist", edge.to))
            })?;

        if from_def.kind != SlotKind::Output {
            return Err(RunError::Validation(format!(
                "source slot {} is not an output",
                edge.from
            )));
        }
        if to_def.kind != SlotKind::Input {
            return Err(RunError::Validation(format!(
                "target slot {} is not an input",
                edge.to
            )));
        }
        if !to_def.accepts(&from_def.data_type) {
            return Err(RunError::Validation(format!(
                "slot {} of type '{}' does not accept data of type '{}' from {}",
                edge.to, to_def.data_type, from_def.data_type, edge.from
            )));
        }

        self.graph.add_edge(
            from_index,
            to_index,
            EdgeData {
                from_slot: edge.from.name,
                to_slot: edge.to.name,
            },
        );
        Ok(())
    }

    /// Returns all edges in insertion order.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .filter_map(|edge_ref| {
                let from = *self.index_to_id.get(&edge_ref.source())?;
                let to = *self.index_to_id.get(&edge_ref.target())?;
                let data = edge_ref.weight();
                Some(Edge {
                    from: SlotRef::new(from, data.from_slot.clone()),
                    to: SlotRef::new(to, data.to_slot.clone()),
                })
            })
            .collect()
    }

    /// Returns whether an edge is a loop feedback edge.
    ///
    /// Feedback edges run from a loop-end node back into a loop-start node;
    /// they are the only tolerated cycle source and are ignored by traversal
    /// and never copied into extracted loop subgraphs.
    pub fn is_feedback_edge(&self, edge: &Edge) -> bool {
        let from_end = self
            .get_node(edge.from.node)
            .is_some_and(|node| node.is_loop_end());
        let to_start = self
            .get_node(edge.to.node)
            .is_some_and(|node| node.is_loop_start());
        from_end && to_start
    }

    /// Returns the output slots feeding an input slot, in edge insertion
    /// order, excluding feedback edges.
    pub fn source_slots(&self, slot: &SlotRef) -> Vec<SlotRef> {
        let Some(index) = self.node_indices.get(&slot.node) else {
            return Vec::new();
        };
        let mut sources: Vec<SlotRef> = self
            .graph
            .edges_directed(*index, Direction::Incoming)
            .filter(|edge_ref| edge_ref.weight().to_slot == slot.name)
            .filter_map(|edge_ref| {
                let from = *self.index_to_id.get(&edge_ref.source())?;
                let source = SlotRef::new(from, edge_ref.weight().from_slot.clone());
                let edge = Edge {
                    from: source.clone(),
                    to: slot.clone(),
                };
                (!self.is_feedback_edge(&edge)).then_some(source)
            })
            .collect();
        // edges_directed iterates most-recent-first
        sources.reverse();
        sources
    }

    /// Returns the input slots fed by an output slot, excluding feedback
    /// edges.
    pub fn target_slots(&self, slot: &SlotRef) -> Vec<SlotRef> {
        let Some(index) = self.node_indices.get(&slot.node) else {
            return Vec::new();
        };
        let mut targets: Vec<SlotRef> = self
            .graph
            .edges_directed(*index, Direction::Outgoing)
            .filter(|edge_ref| edge_ref.weight().from_slot == slot.name)
            .filter_map(|edge_ref| {
                let to = *self.index_to_id.get(&edge_ref.target())?;
                let target = SlotRef::new(to, edge_ref.weight().to_slot.clone());
                let edge = Edge {
                    from: slot.clone(),
                    to: target.clone(),
                };
                (!self.is_feedback_edge(&edge)).then_some(target)
            })
            .collect();
        targets.reverse();
        targets
    }

    /// Returns the direct upstream nodes of a node, excluding feedback
    /// edges, in edge insertion order.
    fn direct_sources(&self, id: NodeId) -> Vec<NodeId> {
        let Some(index) = self.node_indices.get(&id) else {
            return Vec::new();
        };
        let mut sources: Vec<NodeId> = self
            .graph
            .edges_directed(*index, Direction::Incoming)
            .filter_map(|edge_ref| {
                let from = *self.index_to_id.get(&edge_ref.source())?;
                let edge = Edge {
                    from: SlotRef::new(from, edge_ref.weight().from_slot.clone()),
                    to: SlotRef::new(id, edge_ref.weight().to_slot.clone()),
                };
                (!self.is_feedback_edge(&edge)).then_some(from)
            })
            .collect();
        sources.reverse();
        sources.dedup();
        sources
    }

    /// Returns the direct downstream nodes of a node, excluding feedback
    /// edges.
    pub(crate) fn direct_targets(&self, id: NodeId) -> Vec<NodeId> {
        let Some(index) = self.node_indices.get(&id) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeId> = self
            .graph
            .edges_directed(*index, Direction::Outgoing)
            .filter_map(|edge_ref| {
                let to = *self.index_to_id.get(&edge_ref.target())?;
                let edge = Edge {
                    from: SlotRef::new(id, edge_ref.weight().from_slot.clone()),
                    to: SlotRef::new(to, edge_ref.weight().to_slot.clone()),
                };
                (!self.is_feedback_edge(&edge)).then_some(to)
            })
            .collect();
        targets.reverse();
        targets.dedup();
        targets
    }

    /// Returns all slot references in declaration order, with an index map.
    fn slot_declarations(&self) -> (Vec<SlotRef>, HashMap<SlotRef, usize>) {
        let mut slots = Vec::new();
        for (id, node) in self.nodes() {
            for def in node.input_slots() {
                slots.push(SlotRef::new(id, def.name.clone()));
            }
            for def in node.output_slots() {
                slots.push(SlotRef::new(id, def.name.clone()));
            }
        }
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.clone(), i))
            .collect();
        (slots, index)
    }

    /// Traverses all slots in topological order.
    ///
    /// The order guarantees that for every edge the source slot precedes the
    /// target slot, and that all of a node's input slots precede its output
    /// slots. Ties between independent branches are broken by declaration
    /// order, so repeated calls on an unchanged graph produce the same
    /// sequence.
    pub fn traverse_slots(&self) -> RunResult<Vec<SlotRef>> {
        let (slots, index) = self.slot_declarations();
        let count = slots.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];

        for (id, node) in self.nodes() {
            for input in node.input_slots() {
                let input_index = index[&SlotRef::new(id, input.name.clone())];
                for output in node.output_slots() {
                    let output_index = index[&SlotRef::new(id, output.name.clone())];
                    successors[input_index].push(output_index);
                    in_degree[output_index] += 1;
                }
            }
        }
        for edge in self.edges() {
            if self.is_feedback_edge(&edge) {
                continue;
            }
            let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
                continue;
            };
            successors[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(current)) = ready.pop() {
            order.push(slots[current].clone());
            for &next in &successors[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != count {
            return Err(RunError::Validation(
                "pipeline graph contains a cycle outside a loop group".into(),
            ));
        }
        Ok(order)
    }

    /// Traverses all nodes in topological order.
    ///
    /// Nodes are ordered by the first appearance of one of their output
    /// slots in [`Self::traverse_slots`]; nodes without output slots are
    /// appended in insertion order.
    pub fn traverse_nodes(&self) -> RunResult<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for slot in self.traverse_slots()? {
            let is_output = self
                .get_node(slot.node)
                .and_then(|node| node.slot(&slot.name))
                .is_some_and(|def| def.kind == SlotKind::Output);
            if is_output && visited.insert(slot.node) {
                order.push(slot.node);
            }
        }
        for id in &self.insertion {
            if visited.insert(*id) {
                order.push(*id);
            }
        }
        Ok(order)
    }

    /// Returns all upstream nodes of a node in traversal order.
    pub fn predecessors(&self, target: NodeId) -> RunResult<Vec<NodeId>> {
        let mut upstream = HashSet::new();
        let mut stack = self.direct_sources(target);
        while let Some(id) = stack.pop() {
            if upstream.insert(id) {
                stack.extend(self.direct_sources(id));
            }
        }
        upstream.remove(&target);
        Ok(self
            .traverse_nodes()?
            .into_iter()
            .filter(|id| upstream.contains(id))
            .collect())
    }

    /// Computes the state fingerprint of every node.
    ///
    /// A node's fingerprint digests the local state of all of its transitive
    /// predecessors (in traversal order) followed by its own, so any
    /// configuration change upstream changes the fingerprint of every node
    /// downstream of it.
    pub fn fingerprints(&self) -> RunResult<HashMap<NodeId, String>> {
        use sha2::{Digest, Sha256};

        let order = self.traverse_nodes()?;
        let position: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let locals: HashMap<NodeId, String> = self
            .nodes()
            .map(|(id, node)| (id, node.local_state_id()))
            .collect();

        let mut upstream: HashMap<NodeId, BTreeSet<usize>> = HashMap::new();
        let mut fingerprints = HashMap::with_capacity(order.len());
        for id in &order {
            let mut set = BTreeSet::new();
            for source in self.direct_sources(*id) {
                if let Some(i) = position.get(&source) {
                    set.insert(*i);
                }
                if let Some(transitive) = upstream.get(&source) {
                    set.extend(transitive.iter().copied());
                }
            }

            let mut hasher = Sha256::new();
            for i in &set {
                if let Some(local) = locals.get(&order[*i]) {
                    hasher.update(local.as_bytes());
                    hasher.update([0]);
                }
            }
            if let Some(local) = locals.get(id) {
                hasher.update(local.as_bytes());
            }
            fingerprints.insert(*id, hex::encode(hasher.finalize()));
            upstream.insert(*id, set);
        }
        Ok(fingerprints)
    }

    /// Computes the state fingerprint of a single node.
    pub fn state_fingerprint(&self, id: NodeId) -> RunResult<String> {
        self.fingerprints()?
            .remove(&id)
            .ok_or_else(|| RunError::Validation(format!("node {id} does not exist")))
    }

    /// Computes the set of nodes that cannot run.
    ///
    /// A node is deactivated when it is disabled, when a required input has
    /// no source, or when any source node is itself deactivated. Nodes in
    /// `externally_satisfied` have their inputs provided from outside and
    /// are never deactivated for missing sources.
    pub fn deactivated_nodes(
        &self,
        externally_satisfied: &HashSet<NodeId>,
    ) -> RunResult<HashSet<NodeId>> {
        let mut missing = HashSet::new();
        for id in self.traverse_nodes()? {
            let Some(node) = self.get_node(id) else {
                continue;
            };
            if !node.is_enabled() {
                missing.insert(id);
                continue;
            }
            if externally_satisfied.contains(&id) {
                continue;
            }
            for input in node.input_slots() {
                let sources = self.source_slots(&SlotRef::new(id, input.name.clone()));
                if sources.is_empty() {
                    if !input.optional {
                        missing.insert(id);
                        break;
                    }
                } else if sources.iter().any(|source| missing.contains(&source.node)) {
                    missing.insert(id);
                    break;
                }
            }
        }
        Ok(missing)
    }

    /// Copies the selected nodes into a new, independently runnable graph.
    ///
    /// Node identities are preserved so slots can be matched against the
    /// original graph. With `with_edges`, non-feedback edges among the
    /// selected nodes are copied as well.
    pub fn extract(&self, nodes: &HashSet<NodeId>, with_edges: bool) -> RunResult<PipelineGraph> {
        let mut sub = PipelineGraph::new();
        for (id, node) in self.nodes() {
            if nodes.contains(&id) {
                sub.add_node(node.clone());
            }
        }
        if with_edges {
            for edge in self.edges() {
                if nodes.contains(&edge.from.node)
                    && nodes.contains(&edge.to.node)
                    && !self.is_feedback_edge(&edge)
                {
                    sub.add_edge(edge)?;
                }
            }
        }
        sub.rebuild_alias_ids();
        Ok(sub)
    }

    /// Validates the graph structure.
    ///
    /// Checks slot name uniqueness per node, acyclicity outside loop
    /// feedback edges, and (unless `allow_missing_inputs`) that every
    /// required input of an enabled node is connected or externally
    /// satisfied.
    pub fn validate(
        &self,
        externally_satisfied: &HashSet<NodeId>,
        allow_missing_inputs: bool,
    ) -> RunResult<()> {
        for (id, node) in self.nodes() {
            let mut seen = HashSet::new();
            for slot in node.slots() {
                if !seen.insert(slot.name.as_str()) {
                    return Err(RunError::Validation(format!(
                        "node '{}' declares slot '{}' more than once",
                        node.name(),
                        slot.name
                    )));
                }
            }
            if !allow_missing_inputs && node.is_enabled() && !externally_satisfied.contains(&id) {
                for input in node.input_slots() {
                    if !input.optional
                        && self
                            .source_slots(&SlotRef::new(id, input.name.clone()))
                            .is_empty()
                    {
                        return Err(RunError::Validation(format!(
                            "required input slot '{}' of node '{}' has no incoming connection",
                            input.name,
                            node.name()
                        )));
                    }
                }
            }
        }
        self.traverse_slots()?;
        Ok(())
    }

    /// Rebuilds the human-readable alias IDs used for storage paths.
    ///
    /// Aliases are derived from sanitized node names; collisions get a
    /// numeric suffix in insertion order, so an unchanged graph always
    /// produces the same aliases.
    pub fn rebuild_alias_ids(&mut self) {
        let mut used = HashSet::new();
        let mut aliases = HashMap::new();
        for (id, node) in self.nodes() {
            let base = sanitize_alias(node.name());
            let mut alias = base.clone();
            let mut suffix = 2;
            while used.contains(&alias) {
                alias = format!("{base}-{suffix}");
                suffix += 1;
            }
            used.insert(alias.clone());
            aliases.insert(id, alias);
        }
        self.alias_ids = aliases;
    }

    /// Returns the alias ID of a node, falling back to its UUID.
    pub fn alias_id_of(&self, id: NodeId) -> String {
        self.alias_ids
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Converts the graph to a serializable definition.
    pub fn to_definition(&self) -> PipelineDefinition {
        PipelineDefinition {
            metadata: self.metadata.clone(),
            nodes: self
                .nodes()
                .map(|(id, node)| NodeDefinition {
                    id,
                    name: node.name().to_string(),
                    enabled: node.is_enabled(),
                    body: node.body_key().to_string(),
                    config: node.config().clone(),
                    loop_role: node.loop_role(),
                    slots: node.slots().to_vec(),
                })
                .collect(),
            edges: self.edges(),
        }
    }

    /// Creates a graph from a definition, resolving node bodies through the
    /// registry.
    pub fn from_definition(
        definition: PipelineDefinition,
        registry: &NodeRegistry,
    ) -> RunResult<Self> {
        let mut graph = Self::with_metadata(definition.metadata);
        for def in definition.nodes {
            let body = registry.get(&def.body)?;
            let mut builder = Node::builder(def.name)
                .id(def.id)
                .enabled(def.enabled)
                .config(def.config)
                .slots(def.slots)
                .body_keyed(def.body, body);
            if let Some(role) = def.loop_role {
                builder = builder.loop_role(role);
            }
            graph.add_node(builder.build());
        }
        for edge in definition.edges {
            graph.add_edge(edge)?;
        }
        graph.rebuild_alias_ids();
        Ok(graph)
    }
}

/// Sanitizes a node name into a filesystem-friendly alias segment.
fn sanitize_alias(name: &str) -> String {
    let mut alias = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            alias.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            alias.push('-');
            last_dash = true;
        }
    }
    let alias = alias.trim_end_matches('-').to_string();
    if alias.is_empty() { "node".to_string() } else { alias }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::IterationMode;

    fn simple_node(name: &str) -> Node {
        Node::builder(name)
            .input_slot("in", "table")
            .output_slot("out", "table")
            .build()
    }

    fn source_node(name: &str) -> Node {
        Node::builder(name).output_slot("out", "table").build()
    }

    #[test]
    fn test_traverse_slots_is_deterministic() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        let c = graph.add_node(simple_node("c"));
        let d = graph.add_node(
            Node::builder("d")
                .input_slot("left", "table")
                .input_slot("right", "table")
                .output_slot("out", "table")
                .build(),
        );
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((a, "out"), (c, "in")).unwrap();
        graph.connect((b, "out"), (d, "left")).unwrap();
        graph.connect((c, "out"), (d, "right")).unwrap();

        let first = graph.traverse_slots().unwrap();
        let second = graph.traverse_slots().unwrap();
        assert_eq!(first, second);

        // Declaration order breaks the b/c tie.
        let b_out = first.iter().position(|s| *s == SlotRef::new(b, "out"));
        let c_in = first.iter().position(|s| *s == SlotRef::new(c, "in"));
        assert!(b_out < c_in);
    }

    #[test]
    fn test_traverse_slots_inputs_before_outputs() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        graph.connect((a, "out"), (b, "in")).unwrap();

        let order = graph.traverse_slots().unwrap();
        let b_in = order.iter().position(|s| *s == SlotRef::new(b, "in"));
        let b_out = order.iter().position(|s| *s == SlotRef::new(b, "out"));
        assert!(b_in < b_out);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(simple_node("a"));
        let b = graph.add_node(simple_node("b"));
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (a, "in")).unwrap();

        assert!(matches!(
            graph.traverse_slots(),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn test_feedback_edge_is_tolerated() {
        let mut graph = PipelineGraph::new();
        let start = graph.add_node(
            Node::builder("start")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .loop_start(IterationMode::PassThrough)
                .build(),
        );
        let end = graph.add_node(
            Node::builder("end")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .loop_end()
                .build(),
        );
        graph.connect((start, "out"), (end, "in")).unwrap();
        graph.connect((end, "out"), (start, "in")).unwrap();

        let order = graph.traverse_slots().unwrap();
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_type_mismatch_rejected_on_connect() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(Node::builder("a").output_slot("out", "image").build());
        let b = graph.add_node(Node::builder("b").input_slot("in", "table").build());
        assert!(graph.connect((a, "out"), (b, "in")).is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_ancestor_config() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        let c = graph.add_node(simple_node("c"));
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (c, "in")).unwrap();

        let before = graph.fingerprints().unwrap();
        if let Some(node) = graph.get_node_mut(a) {
            node.set_config(serde_json::json!({"seed": 42}));
        }
        let after = graph.fingerprints().unwrap();

        assert_ne!(before[&a], after[&a]);
        assert_ne!(before[&b], after[&b]);
        assert_ne!(before[&c], after[&c]);
    }

    #[test]
    fn test_fingerprint_stable_without_changes() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        graph.connect((a, "out"), (b, "in")).unwrap();

        assert_eq!(graph.fingerprints().unwrap(), graph.fingerprints().unwrap());
    }

    #[test]
    fn test_fingerprint_unaffected_by_downstream() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        graph.connect((a, "out"), (b, "in")).unwrap();

        let before = graph.fingerprints().unwrap();
        if let Some(node) = graph.get_node_mut(b) {
            node.set_config(serde_json::json!({"radius": 3}));
        }
        let after = graph.fingerprints().unwrap();

        assert_eq!(before[&a], after[&a]);
        assert_ne!(before[&b], after[&b]);
    }

    #[test]
    fn test_predecessors_in_traversal_order() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        let c = graph.add_node(simple_node("c"));
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (c, "in")).unwrap();

        assert_eq!(graph.predecessors(c).unwrap(), vec![a, b]);
        assert_eq!(graph.predecessors(a).unwrap(), Vec::<NodeId>::new());
    }

    #[test]
    fn test_deactivated_nodes_propagate() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        let c = graph.add_node(simple_node("c"));
        let dangling = graph.add_node(simple_node("dangling"));
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (c, "in")).unwrap();

        if let Some(node) = graph.get_node_mut(b) {
            node.set_enabled(false);
        }

        let deactivated = graph.deactivated_nodes(&HashSet::new()).unwrap();
        assert!(deactivated.contains(&b));
        assert!(deactivated.contains(&c), "downstream of disabled node");
        assert!(deactivated.contains(&dangling), "missing required input");
        assert!(!deactivated.contains(&a));
    }

    #[test]
    fn test_externally_satisfied_nodes_stay_active() {
        let mut graph = PipelineGraph::new();
        let solo = graph.add_node(simple_node("solo"));

        let mut satisfied = HashSet::new();
        satisfied.insert(solo);
        let deactivated = graph.deactivated_nodes(&satisfied).unwrap();
        assert!(deactivated.is_empty());
    }

    #[test]
    fn test_extract_preserves_ids_and_member_edges() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(source_node("a"));
        let b = graph.add_node(simple_node("b"));
        let c = graph.add_node(simple_node("c"));
        graph.connect((a, "out"), (b, "in")).unwrap();
        graph.connect((b, "out"), (c, "in")).unwrap();

        let members: HashSet<NodeId> = [b, c].into_iter().collect();
        let sub = graph.extract(&members, true).unwrap();

        assert_eq!(sub.node_count(), 2);
        assert!(sub.contains_node(b));
        assert!(sub.contains_node(c));
        assert_eq!(sub.edge_count(), 1, "edge from a is not a member edge");
    }

    #[test]
    fn test_alias_ids_deduplicate() {
        let mut graph = PipelineGraph::new();
        let first = graph.add_node(source_node("Blur Image"));
        let second = graph.add_node(source_node("Blur Image"));
        graph.rebuild_alias_ids();

        assert_eq!(graph.alias_id_of(first), "blur-image");
        assert_eq!(graph.alias_id_of(second), "blur-image-2");
    }

    #[test]
    fn test_validate_rejects_duplicate_slot_names() {
        let mut graph = PipelineGraph::new();
        graph.add_node(
            Node::builder("broken")
                .input_slot("data", "table")
                .output_slot("data", "table")
                .build(),
        );
        assert!(graph.validate(&HashSet::new(), true).is_err());
    }

    #[test]
    fn test_validate_missing_inputs_toggle() {
        let mut graph = PipelineGraph::new();
        graph.add_node(simple_node("orphan"));

        assert!(graph.validate(&HashSet::new(), true).is_ok());
        assert!(graph.validate(&HashSet::new(), false).is_err());
    }
}
