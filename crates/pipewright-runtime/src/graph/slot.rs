//! Slot declarations and slot identities.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::graph::node::NodeId;

/// Direction of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Receives data from upstream output slots.
    #[display("input")]
    Input,
    /// Produced by the owning node's body.
    #[display("output")]
    Output,
}

/// Declaration of a named slot on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
    /// Slot name, unique within the owning node.
    pub name: String,
    /// Slot direction.
    pub kind: SlotKind,
    /// Data type carried by the slot. The type `"any"` matches everything.
    pub data_type: String,
    /// Optional inputs do not deactivate the node when left unconnected.
    #[serde(default)]
    pub optional: bool,
}

impl SlotDef {
    /// Creates a required input slot declaration.
    pub fn input(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Input,
            data_type: data_type.into(),
            optional: false,
        }
    }

    /// Creates an output slot declaration.
    pub fn output(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Output,
            data_type: data_type.into(),
            optional: false,
        }
    }

    /// Marks the slot as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Returns whether this slot accepts data of the given type.
    pub fn accepts(&self, data_type: &str) -> bool {
        self.data_type == "any" || data_type == "any" || self.data_type == data_type
    }
}

/// Identity of a slot for scheduling purposes: owning node plus slot name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{node}:{name}")]
pub struct SlotRef {
    /// Owning node.
    pub node: NodeId,
    /// Slot name within the node.
    pub name: String,
}

impl SlotRef {
    /// Creates a slot reference.
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

impl From<(NodeId, &str)> for SlotRef {
    fn from((node, name): (NodeId, &str)) -> Self {
        SlotRef::new(node, name)
    }
}

impl From<(NodeId, String)> for SlotRef {
    fn from((node, name): (NodeId, String)) -> Self {
        SlotRef::new(node, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_exact_and_wildcard() {
        let slot = SlotDef::input("in", "image");
        assert!(slot.accepts("image"));
        assert!(slot.accepts("any"));
        assert!(!slot.accepts("table"));

        let wildcard = SlotDef::input("in", "any");
        assert!(wildcard.accepts("image"));
    }

    #[test]
    fn test_slot_ref_from_tuple() {
        let node = NodeId::new();
        let slot: SlotRef = (node, "out").into();
        assert_eq!(slot.node, node);
        assert_eq!(slot.name, "out");
    }
}
