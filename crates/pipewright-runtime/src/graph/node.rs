//! Node identifier, node wrapper, and loop role types.

use std::str::FromStr;
use std::sync::Arc;

use derive_more::{Debug as DeriveDebug, Display, From, Into};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::graph::slot::{SlotDef, SlotKind};
use crate::node::{NodeBody, PassThroughBody};

/// Unique identifier for a node in a pipeline graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(DeriveDebug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Creates a new random node ID.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a node ID from an existing UUID.
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// How a loop group iterates over the rows arriving at its start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    /// All rows pass through the loop body in a single sub-run.
    #[default]
    PassThrough,
    /// One sub-run per row of the start node's inputs; outputs are merged
    /// in row order.
    PerRow,
}

/// Marks a node as the boundary of a loop group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LoopRole {
    /// Entry node of a loop group.
    Start {
        /// Iteration semantics for the group.
        iteration_mode: IterationMode,
        /// Forces pass-through regardless of `iteration_mode`.
        pass_through: bool,
    },
    /// Exit node of a loop group.
    End,
}

/// A unit of computation in the pipeline graph.
///
/// A node owns its slot declarations (in declaration order, which traversal
/// tie-breaks rely on), an enabled flag, an opaque configuration value, and
/// the body invoked by the scheduler. The body is an opaque unit of work;
/// the runtime only relies on the contract of [`NodeBody`].
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    enabled: bool,
    config: serde_json::Value,
    loop_role: Option<LoopRole>,
    slots: Vec<SlotDef>,
    body_key: String,
    body: Arc<dyn NodeBody>,
}

impl Node {
    /// Returns a builder for a node with the given display name.
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name)
    }

    /// Returns the node's stable identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the node is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the node.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns the node configuration.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Replaces the node configuration.
    pub fn set_config(&mut self, config: serde_json::Value) {
        self.config = config;
    }

    /// Returns the loop role, if any.
    pub fn loop_role(&self) -> Option<LoopRole> {
        self.loop_role
    }

    /// Sets or clears the loop role.
    pub fn set_loop_role(&mut self, role: Option<LoopRole>) {
        self.loop_role = role;
    }

    /// Returns whether this node starts a loop group.
    pub fn is_loop_start(&self) -> bool {
        matches!(self.loop_role, Some(LoopRole::Start { .. }))
    }

    /// Returns whether this node ends a loop group.
    pub fn is_loop_end(&self) -> bool {
        matches!(self.loop_role, Some(LoopRole::End))
    }

    /// Returns all slot declarations in declaration order.
    pub fn slots(&self) -> &[SlotDef] {
        &self.slots
    }

    /// Returns the input slot declarations in declaration order.
    pub fn input_slots(&self) -> impl Iterator<Item = &SlotDef> {
        self.slots.iter().filter(|slot| slot.kind == SlotKind::Input)
    }

    /// Returns the output slot declarations in declaration order.
    pub fn output_slots(&self) -> impl Iterator<Item = &SlotDef> {
        self.slots.iter().filter(|slot| slot.kind == SlotKind::Output)
    }

    /// Looks up a slot declaration by name.
    pub fn slot(&self, name: &str) -> Option<&SlotDef> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    /// Returns the registry key of the node body.
    pub fn body_key(&self) -> &str {
        &self.body_key
    }

    /// Returns a handle to the node body.
    pub fn body(&self) -> Arc<dyn NodeBody> {
        Arc::clone(&self.body)
    }

    /// Returns the node's local state identifier.
    ///
    /// A deterministic digest over the node's own configuration: body key,
    /// configuration value, and slot shape. The full state fingerprint
    /// additionally folds in the local state of every transitive
    /// predecessor; see `PipelineGraph::state_fingerprint`.
    pub fn local_state_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.body_key.as_bytes());
        hasher.update([0]);
        // serde_json maps serialize with sorted keys, so this is canonical.
        hasher.update(self.config.to_string().as_bytes());
        for slot in &self.slots {
            hasher.update([0]);
            hasher.update(slot.name.as_bytes());
            hasher.update([0]);
            hasher.update(slot.data_type.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("loop_role", &self.loop_role)
            .field("slots", &self.slots)
            .field("body_key", &self.body_key)
            .finish()
    }
}

/// Builder for [`Node`].
#[derive(Clone)]
pub struct NodeBuilder {
    id: NodeId,
    name: String,
    enabled: bool,
    config: serde_json::Value,
    loop_role: Option<LoopRole>,
    slots: Vec<SlotDef>,
    body_key: String,
    body: Option<Arc<dyn NodeBody>>,
}

impl NodeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            enabled: true,
            config: serde_json::Value::Null,
            loop_role: None,
            slots: Vec::new(),
            body_key: String::new(),
            body: None,
        }
    }

    /// Uses a specific node ID instead of a random one.
    pub fn id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Sets the enabled flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the node configuration.
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Declares a required input slot.
    pub fn input_slot(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.slots.push(SlotDef::input(name, data_type));
        self
    }

    /// Declares an optional input slot.
    pub fn optional_input_slot(
        mut self,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        self.slots.push(SlotDef::input(name, data_type).optional());
        self
    }

    /// Declares an output slot.
    pub fn output_slot(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.slots.push(SlotDef::output(name, data_type));
        self
    }

    /// Replaces all slot declarations at once.
    pub fn slots(mut self, slots: Vec<SlotDef>) -> Self {
        self.slots = slots;
        self
    }

    /// Sets an explicit loop role.
    pub fn loop_role(mut self, role: LoopRole) -> Self {
        self.loop_role = Some(role);
        self
    }

    /// Marks the node as a loop start.
    pub fn loop_start(mut self, iteration_mode: IterationMode) -> Self {
        self.loop_role = Some(LoopRole::Start {
            iteration_mode,
            pass_through: false,
        });
        self
    }

    /// Marks the node as a loop end.
    pub fn loop_end(mut self) -> Self {
        self.loop_role = Some(LoopRole::End);
        self
    }

    /// Sets the node body and its registry key.
    pub fn body_keyed(mut self, key: impl Into<String>, body: Arc<dyn NodeBody>) -> Self {
        self.body_key = key.into();
        self.body = Some(body);
        self
    }

    /// Sets the node body with an empty registry key.
    pub fn body(mut self, body: Arc<dyn NodeBody>) -> Self {
        self.body = Some(body);
        self
    }

    /// Builds the node. Without an explicit body the node passes its
    /// inputs through to its outputs.
    pub fn build(self) -> Node {
        let (body_key, body) = match self.body {
            Some(body) => (self.body_key, body),
            None => {
                let key = if self.body_key.is_empty() {
                    crate::node::PASS_THROUGH_KEY.to_string()
                } else {
                    self.body_key
                };
                (key, Arc::new(PassThroughBody) as Arc<dyn NodeBody>)
            }
        };
        Node {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            config: self.config,
            loop_role: self.loop_role,
            slots: self.slots,
            body_key,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().expect("valid uuid");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_builder_slot_order() {
        let node = Node::builder("merge")
            .input_slot("left", "table")
            .input_slot("right", "table")
            .output_slot("merged", "table")
            .build();
        let names: Vec<&str> = node.slots().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["left", "right", "merged"]);
        assert_eq!(node.input_slots().count(), 2);
        assert_eq!(node.output_slots().count(), 1);
    }

    #[test]
    fn test_local_state_id_sensitive_to_config() {
        let a = Node::builder("threshold")
            .config(serde_json::json!({"level": 10}))
            .output_slot("out", "table")
            .build();
        let mut b = a.clone();
        assert_eq!(a.local_state_id(), b.local_state_id());

        b.set_config(serde_json::json!({"level": 11}));
        assert_ne!(a.local_state_id(), b.local_state_id());
    }

    #[test]
    fn test_local_state_id_ignores_identity() {
        // Two nodes with identical configuration but different ids share a
        // local state; the graph-level fingerprint is what separates them.
        let a = Node::builder("threshold").output_slot("out", "table").build();
        let b = Node::builder("threshold").output_slot("out", "table").build();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.local_state_id(), b.local_state_id());
    }
}
