//! Directed connections between slots.

use serde::{Deserialize, Serialize};

use crate::graph::slot::SlotRef;

/// A directed connection from an output slot to an input slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source output slot.
    pub from: SlotRef,
    /// Target input slot.
    pub to: SlotRef,
}

impl Edge {
    /// Creates an edge between two slots.
    pub fn new(from: impl Into<SlotRef>, to: impl Into<SlotRef>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Slot names stored on a petgraph edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EdgeData {
    pub from_slot: String,
    pub to_slot: String,
}
