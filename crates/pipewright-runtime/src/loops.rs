//! Loop-group extraction.
//!
//! A loop group is a designated region of the graph delimited by one
//! loop-start node and one or more loop-end nodes. The scheduler executes
//! the whole group as an opaque sub-run; from the outer traversal's
//! perspective the group is a single atomic step.

use std::collections::{HashSet, VecDeque};

use crate::error::{RunError, RunResult};
use crate::graph::{NodeId, PipelineGraph};

pub use crate::graph::IterationMode;

/// A designated iterative region of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopGroup {
    /// Entry node of the group.
    pub start: NodeId,
    /// Exit nodes of the group, in discovery order.
    pub ends: Vec<NodeId>,
    /// Every node on any path from the start to an end, inclusive.
    pub nodes: HashSet<NodeId>,
}

impl LoopGroup {
    /// Returns whether a node belongs to this group.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }
}

/// Identifies all loop groups in the graph.
///
/// Walks forward from each unvisited, enabled loop-start node, following
/// non-feedback edges and stopping at (and including) loop-end nodes.
/// Starts listed in `seen` or `deactivated` are skipped. Groups must be
/// disjoint; a start whose walk never reaches an end, or walks into another
/// start, is a validation failure.
pub fn extract_loop_groups(
    graph: &PipelineGraph,
    seen: &HashSet<NodeId>,
    deactivated: &HashSet<NodeId>,
) -> RunResult<Vec<LoopGroup>> {
    let mut groups = Vec::new();
    let mut assigned: HashSet<NodeId> = HashSet::new();

    for start in graph.traverse_nodes()? {
        let Some(node) = graph.get_node(start) else {
            continue;
        };
        if !node.is_loop_start() || seen.contains(&start) || deactivated.contains(&start) {
            continue;
        }

        let mut members = HashSet::new();
        let mut ends = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        members.insert(start);
        queue.extend(graph.direct_targets(start));

        while let Some(current) = queue.pop_front() {
            if !members.insert(current) {
                continue;
            }
            let Some(member) = graph.get_node(current) else {
                continue;
            };
            if member.is_loop_start() {
                return Err(RunError::Validation(format!(
                    "loop start '{}' is reachable from loop start '{}'; nested loops are not supported",
                    member.name(),
                    node.name()
                )));
            }
            if member.is_loop_end() {
                ends.push(current);
            } else {
                queue.extend(graph.direct_targets(current));
            }
        }

        if ends.is_empty() {
            return Err(RunError::Validation(format!(
                "loop start '{}' has no reachable loop end",
                node.name()
            )));
        }
        for member in &members {
            if !assigned.insert(*member) {
                return Err(RunError::Validation(format!(
                    "node {member} belongs to more than one loop group"
                )));
            }
        }

        groups.push(LoopGroup {
            start,
            ends,
            nodes: members,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn relay(name: &str) -> Node {
        Node::builder(name)
            .input_slot("in", "table")
            .output_slot("out", "table")
            .build()
    }

    /// source -> start -> mid -> end -> sink
    fn loop_graph() -> (PipelineGraph, [NodeId; 5]) {
        let mut graph = PipelineGraph::new();
        let source = graph.add_node(Node::builder("source").output_slot("out", "table").build());
        let start = graph.add_node(
            Node::builder("start")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .loop_start(IterationMode::PassThrough)
                .build(),
        );
        let mid = graph.add_node(relay("mid"));
        let end = graph.add_node(
            Node::builder("end")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .loop_end()
                .build(),
        );
        let sink = graph.add_node(relay("sink"));
        graph.connect((source, "out"), (start, "in")).unwrap();
        graph.connect((start, "out"), (mid, "in")).unwrap();
        graph.connect((mid, "out"), (end, "in")).unwrap();
        graph.connect((end, "out"), (sink, "in")).unwrap();
        (graph, [source, start, mid, end, sink])
    }

    #[test]
    fn test_extracts_members_between_start_and_end() {
        let (graph, [source, start, mid, end, sink]) = loop_graph();
        let groups =
            extract_loop_groups(&graph, &HashSet::new(), &HashSet::new()).unwrap();

        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.start, start);
        assert_eq!(group.ends, vec![end]);
        assert!(group.contains(start));
        assert!(group.contains(mid));
        assert!(group.contains(end));
        assert!(!group.contains(source));
        assert!(!group.contains(sink));
    }

    #[test]
    fn test_walk_stops_at_end() {
        // The sink is downstream of the end node and must not join the group.
        let (graph, [_, _, _, _, sink]) = loop_graph();
        let groups =
            extract_loop_groups(&graph, &HashSet::new(), &HashSet::new()).unwrap();
        assert!(!groups[0].contains(sink));
    }

    #[test]
    fn test_seen_and_deactivated_starts_are_skipped() {
        let (graph, [_, start, ..]) = loop_graph();

        let mut seen = HashSet::new();
        seen.insert(start);
        assert!(
            extract_loop_groups(&graph, &seen, &HashSet::new())
                .unwrap()
                .is_empty()
        );

        let mut deactivated = HashSet::new();
        deactivated.insert(start);
        assert!(
            extract_loop_groups(&graph, &HashSet::new(), &deactivated)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_missing_end_is_rejected() {
        let mut graph = PipelineGraph::new();
        let start = graph.add_node(
            Node::builder("start")
                .output_slot("out", "table")
                .loop_start(IterationMode::PassThrough)
                .build(),
        );
        let sink = graph.add_node(relay("sink"));
        graph.connect((start, "out"), (sink, "in")).unwrap();

        assert!(matches!(
            extract_loop_groups(&graph, &HashSet::new(), &HashSet::new()),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn test_branching_paths_all_join_group() {
        let mut graph = PipelineGraph::new();
        let start = graph.add_node(
            Node::builder("start")
                .output_slot("out", "table")
                .loop_start(IterationMode::PassThrough)
                .build(),
        );
        let left = graph.add_node(relay("left"));
        let right = graph.add_node(relay("right"));
        let end = graph.add_node(
            Node::builder("end")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .loop_end()
                .build(),
        );
        graph.connect((start, "out"), (left, "in")).unwrap();
        graph.connect((start, "out"), (right, "in")).unwrap();
        graph.connect((left, "out"), (end, "in")).unwrap();
        graph.connect((right, "out"), (end, "in")).unwrap();

        let groups =
            extract_loop_groups(&graph, &HashSet::new(), &HashSet::new()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].nodes.len(), 4);
        assert_eq!(groups[0].ends, vec![end]);
    }
}
