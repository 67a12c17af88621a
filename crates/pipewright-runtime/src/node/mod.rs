//! Node body contract, execution context, and the body registry.
//!
//! Node bodies are the opaque units of work the scheduler invokes: they see
//! their node's input tables, write output tables, and report through the
//! run's progress context. The registry resolves the body keys stored in a
//! serialized [`PipelineDefinition`](crate::graph::PipelineDefinition) back
//! to executable bodies; it stands in for the plugin discovery mechanism at
//! this crate's boundary.

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::{DataRow, DataTable};
use crate::error::{RunError, RunResult};
use crate::progress::ProgressInfo;
use crate::runner::WorkerPool;

/// Registry key of [`PassThroughBody`].
pub const PASS_THROUGH_KEY: &str = "core:pass-through";
/// Registry key of [`RowGenerator`].
pub const ROW_GENERATOR_KEY: &str = "core:row-generator";
/// Registry key of [`AnnotateBody`].
pub const ANNOTATE_KEY: &str = "core:annotate";

/// A unit of computation executed by the scheduler.
///
/// Implementations must be safe to invoke at most once per
/// (node, state fingerprint); the scheduler re-invokes only on a cache miss.
/// Long-running bodies should poll `ctx.progress().is_cancelled()` between
/// work items; the scheduler itself only checks between traversal steps.
pub trait NodeBody: Send + Sync {
    /// Runs the node on the given context.
    fn run(&self, ctx: &mut NodeContext) -> RunResult<()>;
}

/// Execution context handed to a node body.
///
/// Owns the node's input tables for this invocation and the (initially
/// empty) output tables the body is expected to fill.
pub struct NodeContext {
    node_name: String,
    config: serde_json::Value,
    inputs: Vec<(String, DataTable)>,
    outputs: Vec<(String, DataTable)>,
    progress: ProgressInfo,
    pool: Arc<WorkerPool>,
}

impl NodeContext {
    pub(crate) fn new(
        node_name: impl Into<String>,
        config: serde_json::Value,
        inputs: Vec<(String, DataTable)>,
        outputs: Vec<(String, DataTable)>,
        progress: ProgressInfo,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            config,
            inputs,
            outputs,
            progress,
            pool,
        }
    }

    /// Returns the display name of the node being executed.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Returns the node configuration.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Returns the progress context of this invocation.
    pub fn progress(&self) -> &ProgressInfo {
        &self.progress
    }

    /// Returns the shared worker pool, for bodies that parallelize
    /// internally.
    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    /// Returns an input table by slot name.
    pub fn input(&self, name: &str) -> Option<&DataTable> {
        self.inputs
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, table)| table)
    }

    /// Returns all input tables in slot declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &DataTable)> {
        self.inputs
            .iter()
            .map(|(name, table)| (name.as_str(), table))
    }

    /// Returns an output table by slot name.
    pub fn output(&self, name: &str) -> Option<&DataTable> {
        self.outputs
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, table)| table)
    }

    /// Returns a mutable output table by slot name.
    pub fn output_mut(&mut self, name: &str) -> Option<&mut DataTable> {
        self.outputs
            .iter_mut()
            .find(|(slot, _)| slot == name)
            .map(|(_, table)| table)
    }

    /// Returns the output slot names in declaration order.
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Appends a row to an output slot.
    pub fn push_row(&mut self, slot: &str, row: DataRow) -> RunResult<()> {
        let node = self.node_name.clone();
        self.output_mut(slot)
            .map(|table| table.push(row))
            .ok_or_else(|| {
                RunError::Internal(format!("node '{node}' has no output slot '{slot}'"))
            })
    }

    pub(crate) fn into_outputs(self) -> Vec<(String, DataTable)> {
        self.outputs
    }
}

/// Resolves body registry keys to executable node bodies.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    bodies: HashMap<String, Arc<dyn NodeBody>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in bodies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PASS_THROUGH_KEY, Arc::new(PassThroughBody));
        registry.register(ROW_GENERATOR_KEY, Arc::new(RowGenerator::default()));
        registry.register(ANNOTATE_KEY, Arc::new(AnnotateBody));
        registry
    }

    /// Registers a body under a key, replacing any previous entry.
    pub fn register(&mut self, key: impl Into<String>, body: Arc<dyn NodeBody>) {
        self.bodies.insert(key.into(), body);
    }

    /// Resolves a body by key.
    pub fn get(&self, key: &str) -> RunResult<Arc<dyn NodeBody>> {
        self.bodies
            .get(key)
            .map(Arc::clone)
            .ok_or_else(|| RunError::Validation(format!("unknown node body '{key}'")))
    }

    /// Returns whether a key is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.bodies.contains_key(key)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.bodies.keys().collect();
        keys.sort();
        f.debug_struct("NodeRegistry").field("keys", &keys).finish()
    }
}

/// Copies all input rows to every output slot, keeping annotations.
///
/// The default body for nodes built without an explicit one; loop start and
/// end nodes are typically plain pass-throughs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughBody;

impl NodeBody for PassThroughBody {
    fn run(&self, ctx: &mut NodeContext) -> RunResult<()> {
        let gathered: Vec<DataTable> = ctx.inputs().map(|(_, table)| table.clone()).collect();
        for name in ctx.output_names() {
            if let Some(output) = ctx.output_mut(&name) {
                for table in &gathered {
                    output.append_from(table);
                }
            }
        }
        Ok(())
    }
}

/// Emits a configurable number of rows into every output slot.
///
/// Row count comes from the constructor or from the node configuration
/// (`{"count": n, "value": ...}`); without a configured value each row
/// carries its own index.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowGenerator {
    count: Option<usize>,
}

impl RowGenerator {
    /// Creates a generator with a fixed row count.
    pub fn new(count: usize) -> Self {
        Self { count: Some(count) }
    }
}

impl NodeBody for RowGenerator {
    fn run(&self, ctx: &mut NodeContext) -> RunResult<()> {
        let count = self
            .count
            .or_else(|| ctx.config().get("count").and_then(|v| v.as_u64()).map(|v| v as usize))
            .unwrap_or(1);
        let template = ctx.config().get("value").cloned();
        for name in ctx.output_names() {
            for i in 0..count {
                let value = template.clone().unwrap_or_else(|| serde_json::json!(i));
                ctx.push_row(&name, DataRow::new(value))?;
            }
        }
        Ok(())
    }
}

/// Copies inputs to outputs, attaching a configured annotation to each row.
///
/// Configuration: `{"key": ..., "value": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotateBody;

impl NodeBody for AnnotateBody {
    fn run(&self, ctx: &mut NodeContext) -> RunResult<()> {
        let key = ctx
            .config()
            .get("key")
            .and_then(|v| v.as_str())
            .unwrap_or("annotation")
            .to_string();
        let value = ctx
            .config()
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut extra = std::collections::BTreeMap::new();
        extra.insert(key, value);

        let gathered: Vec<DataTable> = ctx.inputs().map(|(_, table)| table.clone()).collect();
        for name in ctx.output_names() {
            if let Some(output) = ctx.output_mut(&name) {
                for table in &gathered {
                    output.append_annotated(table, &extra);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context(
        config: serde_json::Value,
        inputs: Vec<(String, DataTable)>,
        outputs: Vec<&str>,
    ) -> NodeContext {
        NodeContext::new(
            "test-node",
            config,
            inputs,
            outputs
                .into_iter()
                .map(|name| (name.to_string(), DataTable::new("table")))
                .collect(),
            ProgressInfo::new(),
            Arc::new(WorkerPool::new(1)),
        )
    }

    #[test]
    fn test_pass_through_copies_all_inputs() {
        let mut left = DataTable::new("table");
        left.push(DataRow::new(1));
        let mut right = DataTable::new("table");
        right.push(DataRow::new(2));
        right.push(DataRow::new(3));

        let mut ctx = test_context(
            serde_json::Value::Null,
            vec![("left".into(), left), ("right".into(), right)],
            vec!["out"],
        );
        PassThroughBody.run(&mut ctx).unwrap();
        assert_eq!(ctx.output("out").unwrap().len(), 3);
    }

    #[test]
    fn test_row_generator_reads_config() {
        let mut ctx = test_context(serde_json::json!({"count": 5}), Vec::new(), vec!["out"]);
        RowGenerator::default().run(&mut ctx).unwrap();
        assert_eq!(ctx.output("out").unwrap().len(), 5);
    }

    #[test]
    fn test_row_generator_fixed_count_wins() {
        let mut ctx = test_context(serde_json::json!({"count": 5}), Vec::new(), vec!["out"]);
        RowGenerator::new(2).run(&mut ctx).unwrap();
        assert_eq!(ctx.output("out").unwrap().len(), 2);
    }

    #[test]
    fn test_annotate_body() {
        let mut input = DataTable::new("table");
        input.push(DataRow::new("x"));

        let mut ctx = test_context(
            serde_json::json!({"key": "batch", "value": "7"}),
            vec![("in".into(), input)],
            vec!["out"],
        );
        AnnotateBody.run(&mut ctx).unwrap();
        let out = ctx.output("out").unwrap();
        assert_eq!(out.rows[0].annotations["batch"], "7");
    }

    #[test]
    fn test_registry_resolves_builtins() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.get(PASS_THROUGH_KEY).is_ok());
        assert!(registry.get(ROW_GENERATOR_KEY).is_ok());
        assert!(registry.get("plugin:missing").is_err());
    }

    #[test]
    fn test_push_row_unknown_slot() {
        let mut ctx = test_context(serde_json::Value::Null, Vec::new(), vec!["out"]);
        assert!(ctx.push_row("nope", DataRow::new(1)).is_err());
    }
}
