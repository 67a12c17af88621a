//! Serializable pipeline definition.

use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::{LoopRole, NodeId};
use super::slot::SlotDef;
use crate::error::RunError;
use crate::graph::PipelineGraph;
use crate::node::NodeRegistry;

/// Pipeline metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Pipeline name.
    #[serde(default)]
    pub name: String,
    /// Pipeline description.
    #[serde(default)]
    pub description: String,
}

/// Serializable form of a node.
///
/// The body is referenced by its registry key; resolving it back to an
/// executable node requires a [`NodeRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Stable node identity.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Enabled flag.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Registry key of the node body.
    pub body: String,
    /// Opaque node configuration.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Loop role, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_role: Option<LoopRole>,
    /// Slot declarations in declaration order.
    pub slots: Vec<SlotDef>,
}

fn default_enabled() -> bool {
    true
}

/// Serializable pipeline definition.
///
/// This is the JSON-friendly representation of a pipeline graph, also
/// written next to run outputs for reproducibility. Use
/// [`PipelineGraph::to_definition`] and [`PipelineGraph::from_definition`]
/// to convert between the two representations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline metadata.
    #[serde(default)]
    pub metadata: PipelineMetadata,
    /// Nodes in declaration order.
    pub nodes: Vec<NodeDefinition>,
    /// Edges connecting slots.
    pub edges: Vec<Edge>,
}

impl PipelineDefinition {
    /// Converts this definition into a pipeline graph.
    pub fn into_graph(self, registry: &NodeRegistry) -> Result<PipelineGraph, RunError> {
        PipelineGraph::from_definition(self, registry)
    }
}

impl From<&PipelineGraph> for PipelineDefinition {
    fn from(graph: &PipelineGraph) -> Self {
        graph.to_definition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Node;

    #[test]
    fn test_definition_roundtrip() {
        let mut graph = PipelineGraph::new();
        let a = graph.add_node(
            Node::builder("source")
                .output_slot("out", "table")
                .body_keyed("core:row-generator", crate::node::NodeRegistry::with_builtins()
                    .get("core:row-generator")
                    .unwrap())
                .config(serde_json::json!({"count": 3}))
                .build(),
        );
        let b = graph.add_node(
            Node::builder("sink")
                .input_slot("in", "table")
                .output_slot("out", "table")
                .body_keyed("core:pass-through", crate::node::NodeRegistry::with_builtins()
                    .get("core:pass-through")
                    .unwrap())
                .build(),
        );
        graph.connect((a, "out"), (b, "in")).unwrap();

        let definition = graph.to_definition();
        let json = serde_json::to_string_pretty(&definition).unwrap();
        let parsed: PipelineDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(definition, parsed);

        let registry = NodeRegistry::with_builtins();
        let rebuilt = parsed.into_graph(&registry).unwrap();
        assert_eq!(rebuilt.node_count(), 2);
        assert_eq!(rebuilt.edge_count(), 1);
        assert!(rebuilt.contains_node(a));
        assert!(rebuilt.contains_node(b));
        assert_eq!(
            rebuilt.get_node(a).unwrap().config(),
            &serde_json::json!({"count": 3})
        );
    }

    #[test]
    fn test_unknown_body_key_is_rejected() {
        let definition = PipelineDefinition {
            metadata: PipelineMetadata::default(),
            nodes: vec![NodeDefinition {
                id: NodeId::new(),
                name: "mystery".into(),
                enabled: true,
                body: "plugin:not-installed".into(),
                config: serde_json::Value::Null,
                loop_role: None,
                slots: vec![SlotDef::output("out", "table")],
            }],
            edges: Vec::new(),
        };

        let registry = NodeRegistry::with_builtins();
        assert!(definition.into_graph(&registry).is_err());
    }
}
