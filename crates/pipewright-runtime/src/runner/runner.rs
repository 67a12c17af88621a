//! The graph runner: ordered traversal, cache decisions, and reclamation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use strum::Display;
use tokio::sync::broadcast;

use super::config::RunConfig;
use super::events::{RunErrorKind, RunEvent};
use super::pool::WorkerPool;
use crate::cache::CacheStore;
use crate::data::DataTable;
use crate::error::{RunError, RunResult};
use crate::gc::{GcEvent, GcHelper};
use crate::graph::{
    IterationMode, LoopRole, Node, NodeId, PipelineGraph, SlotKind, SlotRef,
};
use crate::loops::{LoopGroup, extract_loop_groups};
use crate::node::NodeContext;
use crate::progress::ProgressInfo;

/// Tracing target for runner operations.
const TRACING_TARGET: &str = "pipewright_runtime::runner";

/// Lifecycle state of a [`GraphRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunnerState {
    /// Constructed, not yet started.
    Created,
    /// Validating the graph and creating output storage.
    Preparing,
    /// Draining the slot traversal.
    Running,
    /// Finished successfully.
    Completed,
    /// Aborted with an error.
    Failed,
    /// Aborted by user request.
    Cancelled,
}

/// Executes one pipeline run.
///
/// The runner operates on a defensive copy of the graph taken at
/// construction, so concurrent edits to the authoring graph never affect an
/// in-flight run. The traversal itself is single-threaded; node bodies are
/// dispatched to the shared bounded [`WorkerPool`] and awaited before the
/// traversal advances.
///
/// The runner stays queryable after the run: its progress context (and
/// therefore the full log) and any persistent slot tables remain available
/// on failure as well as on success.
pub struct GraphRunner {
    graph: PipelineGraph,
    config: RunConfig,
    cache: Option<Arc<CacheStore>>,
    pool: Arc<WorkerPool>,
    progress: ProgressInfo,
    state: RunnerState,
    events: broadcast::Sender<RunEvent>,
    seed_inputs: HashMap<SlotRef, DataTable>,
    slot_data: HashMap<SlotRef, DataTable>,
}

impl GraphRunner {
    /// Creates a runner over a defensive copy of the given graph.
    pub fn new(graph: &PipelineGraph, config: RunConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let pool = Arc::new(WorkerPool::new(config.num_threads));
        let mut graph = graph.clone();
        graph.rebuild_alias_ids();
        Self {
            graph,
            config,
            cache: None,
            pool,
            progress: ProgressInfo::new(),
            state: RunnerState::Created,
            events,
            seed_inputs: HashMap::new(),
            slot_data: HashMap::new(),
        }
    }

    /// Attaches a shared cache store.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Uses the given progress context instead of a fresh one.
    pub fn with_progress(mut self, progress: ProgressInfo) -> Self {
        self.progress = progress;
        self
    }

    /// Shares an existing worker pool instead of creating one.
    pub(crate) fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Pre-populates input slots, for loop sub-runs.
    pub(crate) fn with_seed_inputs(mut self, seeds: HashMap<SlotRef, DataTable>) -> Self {
        self.seed_inputs = seeds;
        self
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Returns the run's progress context.
    pub fn progress(&self) -> &ProgressInfo {
        &self.progress
    }

    /// Returns the runner's copy of the graph.
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Subscribes to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Returns the retained table of a slot, if the owning node is listed in
    /// [`RunConfig::persistent_nodes`] (or the run has not released it yet).
    pub fn slot_table(&self, slot: &SlotRef) -> Option<&DataTable> {
        self.slot_data.get(slot)
    }

    /// Executes the run to completion, failure, or cancellation.
    pub async fn run(&mut self) -> RunResult<()> {
        if self.state != RunnerState::Created {
            return Err(RunError::Internal(format!(
                "runner in state {} cannot be started again",
                self.state
            )));
        }

        self.progress.clear_log();
        self.progress.log(format!(
            "Pipewright run starting at {}",
            jiff::Zoned::now().strftime("%Y-%m-%d %H:%M:%S %Z")
        ));
        self.set_state(RunnerState::Preparing);
        self.emit(RunEvent::Started);

        let result = self.execute().await;

        match &result {
            Ok(()) => {
                self.set_state(RunnerState::Completed);
                self.progress.log(format!(
                    "Run ending at {}",
                    jiff::Zoned::now().strftime("%Y-%m-%d %H:%M:%S %Z")
                ));
                self.emit(RunEvent::Finished);
            }
            Err(error) if error.is_cancellation() => {
                self.set_state(RunnerState::Cancelled);
                self.progress.log("Run was cancelled");
                self.emit(RunEvent::Interrupted {
                    kind: RunErrorKind::Cancellation,
                    message: error.to_string(),
                });
            }
            Err(error) => {
                self.set_state(RunnerState::Failed);
                self.progress.log(format!("Run failed: {error}"));
                self.emit(RunEvent::Interrupted {
                    kind: RunErrorKind::from(error),
                    message: error.to_string(),
                });
            }
        }

        // Best-effort log flush so the run stays inspectable after failure.
        self.write_log();
        result
    }

    async fn execute(&mut self) -> RunResult<()> {
        self.prepare()?;
        self.set_state(RunnerState::Running);
        self.progress.log(format!(
            "Running pipeline with {} threads ...",
            self.config.num_threads
        ));
        self.run_pipeline().await?;
        self.postprocess()?;
        Ok(())
    }

    /// Validates the graph and creates output storage locations.
    fn prepare(&mut self) -> RunResult<()> {
        self.progress.log("Preparing output folders ...");
        self.graph.validate(
            &self.config.externally_satisfied,
            self.config.allow_missing_inputs,
        )?;
        self.graph.rebuild_alias_ids();

        if let Some(output) = self.config.output_path.clone() {
            std::fs::create_dir_all(output.join("_scratch"))?;
            for (id, node) in self.graph.nodes() {
                for def in node.output_slots() {
                    let dir = output.join(self.graph.alias_id_of(id)).join(&def.name);
                    std::fs::create_dir_all(dir)?;
                }
            }
            self.progress
                .log(format!("Outputs will be written to {}", output.display()));
        }
        Ok(())
    }

    /// Drains the slot traversal.
    async fn run_pipeline(&mut self) -> RunResult<()> {
        let deactivated = self
            .graph
            .deactivated_nodes(&self.config.externally_satisfied)?;
        let order = self.graph.traverse_slots()?;
        let node_order = self.graph.traverse_nodes()?;
        let fingerprints = self.graph.fingerprints()?;

        let gc = GcHelper::new(&self.graph);
        self.progress.resolve("GC").log(format!("GC status: {gc}"));

        let loop_groups = extract_loop_groups(&self.graph, &HashSet::new(), &deactivated)?;
        let mut node_loops: HashMap<NodeId, usize> = HashMap::new();
        for (index, group) in loop_groups.iter().enumerate() {
            for id in &group.nodes {
                node_loops.insert(*id, index);
            }
        }

        let mut executed: HashSet<NodeId> = HashSet::new();
        let mut executed_loops: HashSet<usize> = HashSet::new();
        self.slot_data = std::mem::take(&mut self.seed_inputs);
        self.progress.set_max_progress(order.len());

        for (index, slot) in order.iter().enumerate() {
            if self.progress.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            self.progress.set_progress(index);

            let node_id = slot.node;
            let Some(node) = self.graph.get_node(node_id) else {
                continue;
            };
            let is_output = node
                .slot(&slot.name)
                .is_some_and(|def| def.kind == SlotKind::Output);
            let display = format!("{}/{}", self.graph.alias_id_of(node_id), slot.name);

            if !deactivated.contains(&node_id) {
                self.progress.log(&display);
                self.emit(RunEvent::StatusUpdated {
                    progress: index,
                    max: order.len(),
                    message: display,
                });
            }

            if !is_output {
                if !deactivated.contains(&node_id) {
                    self.copy_into_input(slot);
                }
            } else {
                match node_loops.get(&node_id).copied() {
                    None => {
                        if !executed.contains(&node_id) {
                            if deactivated.contains(&node_id) {
                                executed.insert(node_id);
                            } else {
                                self.run_node(node_id, &fingerprints).await?;
                                executed.insert(node_id);
                            }
                            gc.mark_node_executed(node_id);
                        }
                    }
                    Some(group_index) => {
                        if !executed_loops.contains(&group_index) {
                            let group = &loop_groups[group_index];
                            if !deactivated.contains(&node_id) {
                                // Only start the loop at the start node.
                                if node_id != group.start {
                                    continue;
                                }
                                self.execute_loop_group(group_index, group).await?;
                            }
                            executed_loops.insert(group_index);
                            for member in node_order.iter().filter(|id| group.contains(**id)) {
                                executed.insert(*member);
                            }
                            self.mark_loop_group_in_gc(&gc, group, &node_order);
                        }
                        executed.insert(node_id);
                    }
                }
            }
            self.react_to_gc(&gc, &fingerprints)?;
        }

        // Some nodes never surface in the slot order: postprocessors without
        // output slots. Run them in a final sweep.
        for node_id in &node_order {
            if self.progress.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            if !executed.contains(node_id) && !deactivated.contains(node_id) {
                self.run_node(*node_id, &fingerprints).await?;
                executed.insert(*node_id);
                gc.mark_node_executed(*node_id);
                self.react_to_gc(&gc, &fingerprints)?;
            }
        }

        let gc_progress = self.progress.resolve("GC");
        gc_progress.log(format!("GC status: {gc}"));
        for slot in gc.incomplete_slots() {
            gc_progress.log(format!("Found incomplete GC slot: {slot}"));
        }
        gc.mark_all_completed();
        self.react_to_gc(&gc, &fingerprints)?;
        Ok(())
    }

    /// Copies data from every connected source output into an input slot.
    ///
    /// Safe by construction: the producing nodes are guaranteed earlier in
    /// the traversal order. Rows are appended, keeping their annotations.
    fn copy_into_input(&mut self, slot: &SlotRef) {
        let sources = self.graph.source_slots(slot);
        if sources.is_empty() {
            return;
        }
        let data_type = self
            .graph
            .get_node(slot.node)
            .and_then(|node| node.slot(&slot.name))
            .map(|def| def.data_type.clone())
            .unwrap_or_else(|| "any".to_string());
        for source in sources {
            let Some(table) = self.slot_data.get(&source).cloned() else {
                continue;
            };
            self.slot_data
                .entry(slot.clone())
                .or_insert_with(|| DataTable::new(data_type.clone()))
                .append_from(&table);
        }
    }

    /// Runs a node body, or restores its outputs from the cache.
    async fn run_node(
        &mut self,
        node_id: NodeId,
        fingerprints: &HashMap<NodeId, String>,
    ) -> RunResult<()> {
        let Some(node) = self.graph.get_node(node_id) else {
            return Ok(());
        };
        let node = node.clone();
        let alias = self.graph.alias_id_of(node_id);
        let sub_progress = self.progress.resolve(node.name());
        let fingerprint = fingerprints.get(&node_id).cloned().unwrap_or_default();

        if self.config.load_from_cache
            && !self.config.disable_cache_nodes.contains(&node_id)
            && self.try_load_from_cache(&node, &fingerprint, &sub_progress)
        {
            sub_progress.log("Output data was loaded from cache. Not executing.");
            return Ok(());
        }

        let inputs: Vec<(String, DataTable)> = node
            .input_slots()
            .map(|def| {
                let slot = SlotRef::new(node_id, def.name.clone());
                let table = self
                    .slot_data
                    .remove(&slot)
                    .unwrap_or_else(|| DataTable::new(def.data_type.clone()));
                (def.name.clone(), table)
            })
            .collect();
        let outputs: Vec<(String, DataTable)> = node
            .output_slots()
            .map(|def| (def.name.clone(), DataTable::new(def.data_type.clone())))
            .collect();

        if sub_progress.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            node = %node_id,
            name = node.name(),
            "Dispatching node body"
        );
        let ctx = NodeContext::new(
            node.name(),
            node.config().clone(),
            inputs,
            outputs,
            sub_progress.clone(),
            Arc::clone(&self.pool),
        );
        let body = node.body();
        let outcome = self
            .pool
            .run(move || {
                let mut ctx = ctx;
                body.run(&mut ctx).map(|()| ctx.into_outputs())
            })
            .await;

        let produced = match outcome {
            Ok(Ok(produced)) => produced,
            Ok(Err(error)) => return Err(error.into_node_failure(node.name(), &alias)),
            Err(error) => return Err(error.into_node_failure(node.name(), &alias)),
        };
        for (name, table) in produced {
            self.slot_data.insert(SlotRef::new(node_id, name), table);
        }
        Ok(())
    }

    /// Attempts to restore all output slots of a node from the cache.
    ///
    /// Succeeds only on a full hit: every output slot present and
    /// non-empty for the exact fingerprint.
    fn try_load_from_cache(
        &mut self,
        node: &Node,
        fingerprint: &str,
        progress: &ProgressInfo,
    ) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let cached = cache.query(node.id(), fingerprint);
        if cached.is_empty() {
            return false;
        }
        progress.log(format!(
            "Accessing cache of node {} ({})",
            node.id(),
            node.name()
        ));
        for def in node.output_slots() {
            match cached.get(&def.name) {
                None => {
                    progress.log(format!(
                        "Cache access failed. Missing output slot {}",
                        def.name
                    ));
                    return false;
                }
                Some(table) if table.is_empty() => {
                    progress.log(format!("Cache for slot {} is empty!", def.name));
                    return false;
                }
                Some(_) => {}
            }
        }
        for def in node.output_slots() {
            if let Some(table) = cached.get(&def.name) {
                self.slot_data
                    .insert(SlotRef::new(node.id(), def.name.clone()), table.clone());
            }
        }
        progress.log("Cache data access successful.");
        true
    }

    /// Extracts and executes a loop group as an opaque sub-run.
    async fn execute_loop_group(&mut self, number: usize, group: &LoopGroup) -> RunResult<()> {
        let sub_progress = self.progress.resolve_and_log(format!("Loop id={}", number + 1));

        let mut subgraph = self.graph.extract(&group.nodes, true)?;
        // The nested runner must not re-extract the same group.
        for member in &group.nodes {
            if let Some(node) = subgraph.get_node_mut(*member) {
                node.set_loop_role(None);
            }
        }

        let iteration_mode = match self
            .graph
            .get_node(group.start)
            .and_then(|node| node.loop_role())
        {
            Some(LoopRole::Start {
                iteration_mode,
                pass_through,
            }) => {
                if pass_through {
                    IterationMode::PassThrough
                } else {
                    iteration_mode
                }
            }
            _ => IterationMode::PassThrough,
        };

        let start_inputs: Vec<(SlotRef, DataTable)> = self
            .graph
            .get_node(group.start)
            .map(|node| {
                node.input_slots()
                    .map(|def| {
                        let slot = SlotRef::new(group.start, def.name.clone());
                        let table = self
                            .slot_data
                            .get(&slot)
                            .cloned()
                            .unwrap_or_else(|| DataTable::new(def.data_type.clone()));
                        (slot, table)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let result_slots = self.loop_result_slots(group);
        let sub_config = RunConfig {
            output_path: None,
            num_threads: self.config.num_threads,
            load_from_cache: false,
            store_to_cache: false,
            save_to_disk: false,
            disable_cache_nodes: HashSet::new(),
            disable_disk_nodes: HashSet::new(),
            externally_satisfied: [group.start].into_iter().collect(),
            persistent_nodes: result_slots.iter().map(|slot| slot.node).collect(),
            allow_missing_inputs: true,
        };

        match iteration_mode {
            IterationMode::PassThrough => {
                let seeds: HashMap<SlotRef, DataTable> = start_inputs.into_iter().collect();
                let results = self
                    .run_loop_iteration(&subgraph, sub_config, &sub_progress, seeds, &result_slots)
                    .await?;
                self.merge_loop_results(results);
            }
            IterationMode::PerRow => {
                let steps = start_inputs
                    .iter()
                    .map(|(_, table)| table.len())
                    .max()
                    .unwrap_or(0);
                for step in 0..steps {
                    if sub_progress.is_cancelled() {
                        return Err(RunError::Cancelled);
                    }
                    let step_progress =
                        sub_progress.resolve_and_log(format!("Iteration {}/{}", step + 1, steps));
                    let seeds: HashMap<SlotRef, DataTable> = start_inputs
                        .iter()
                        .map(|(slot, table)| {
                            let sliced = table
                                .slice_row(step)
                                .unwrap_or_else(|| DataTable::new(table.data_type.clone()));
                            (slot.clone(), sliced)
                        })
                        .collect();
                    let results = self
                        .run_loop_iteration(
                            &subgraph,
                            sub_config.clone(),
                            &step_progress,
                            seeds,
                            &result_slots,
                        )
                        .await?;
                    self.merge_loop_results(results);
                }
            }
        }
        Ok(())
    }

    /// Output slots of a loop group whose data must survive the sub-run:
    /// loop-end outputs plus member outputs with consumers outside the
    /// group.
    fn loop_result_slots(&self, group: &LoopGroup) -> Vec<SlotRef> {
        let mut slots = Vec::new();
        for (id, node) in self.graph.nodes() {
            if !group.contains(id) {
                continue;
            }
            for def in node.output_slots() {
                let slot = SlotRef::new(id, def.name.clone());
                let external_consumer = self
                    .graph
                    .target_slots(&slot)
                    .iter()
                    .any(|target| !group.contains(target.node));
                if node.is_loop_end() || external_consumer {
                    slots.push(slot);
                }
            }
        }
        slots
    }

    /// Runs one iteration of a loop group on a nested runner.
    async fn run_loop_iteration(
        &self,
        subgraph: &PipelineGraph,
        config: RunConfig,
        progress: &ProgressInfo,
        seeds: HashMap<SlotRef, DataTable>,
        result_slots: &[SlotRef],
    ) -> RunResult<Vec<(SlotRef, DataTable)>> {
        let mut sub = GraphRunner::new(subgraph, config)
            .with_pool(Arc::clone(&self.pool))
            .with_progress(progress.detach())
            .with_seed_inputs(seeds);
        let fut: BoxFuture<'_, RunResult<()>> = Box::pin(sub.run());
        fut.await?;

        Ok(result_slots
            .iter()
            .filter_map(|slot| {
                sub.slot_table(slot)
                    .cloned()
                    .map(|table| (slot.clone(), table))
            })
            .collect())
    }

    /// Row-appends loop results into the outer slots.
    fn merge_loop_results(&mut self, results: Vec<(SlotRef, DataTable)>) {
        for (slot, table) in results {
            self.slot_data
                .entry(slot)
                .or_insert_with(|| DataTable::new(table.data_type.clone()))
                .append_from(&table);
        }
    }

    /// Completes a whole loop group in the outer GC in one step.
    ///
    /// Interior slots are force-completed (idempotent, so later decrements
    /// are no-ops); boundary counters drain exactly once through the
    /// member execution marks.
    fn mark_loop_group_in_gc(&self, gc: &GcHelper, group: &LoopGroup, node_order: &[NodeId]) {
        for member in node_order.iter().filter(|id| group.contains(**id)) {
            let Some(node) = self.graph.get_node(*member) else {
                continue;
            };
            for def in node.input_slots() {
                gc.mark_completed(&SlotRef::new(*member, def.name.clone()));
            }
            for def in node.output_slots() {
                let slot = SlotRef::new(*member, def.name.clone());
                let external_consumer = self
                    .graph
                    .target_slots(&slot)
                    .iter()
                    .any(|target| !group.contains(target.node));
                if !node.is_loop_end() && !external_consumer {
                    gc.mark_completed(&slot);
                }
            }
        }
        for member in node_order.iter().filter(|id| group.contains(**id)) {
            gc.mark_node_executed(*member);
        }
    }

    /// Reacts to GC transitions: destroys consumed inputs, stores and
    /// flushes completed outputs, then releases them.
    fn react_to_gc(
        &mut self,
        gc: &GcHelper,
        fingerprints: &HashMap<NodeId, String>,
    ) -> RunResult<()> {
        loop {
            let events = gc.drain_events();
            if events.is_empty() {
                return Ok(());
            }
            for event in events {
                match event {
                    GcEvent::SlotCompleted(slot) => {
                        self.emit(RunEvent::SlotCompleted(slot.clone()));
                        self.finalize_completed_slot(&slot, gc, fingerprints)?;
                    }
                    GcEvent::SlotFlushed(slot) => {
                        self.emit(RunEvent::SlotFlushed(slot));
                    }
                }
            }
        }
    }

    fn finalize_completed_slot(
        &mut self,
        slot: &SlotRef,
        gc: &GcHelper,
        fingerprints: &HashMap<NodeId, String>,
    ) -> RunResult<()> {
        let Some(node) = self.graph.get_node(slot.node) else {
            return Ok(());
        };
        let Some(kind) = node.slot(&slot.name).map(|def| def.kind) else {
            return Ok(());
        };
        let node_name = node.name().to_string();
        let display = format!("{}/{}", self.graph.alias_id_of(slot.node), slot.name);
        let gc_progress = self.progress.resolve("GC");

        match kind {
            SlotKind::Input => {
                if self.slot_data.remove(slot).is_some() {
                    gc_progress.log(format!("Clearing input slot {display}"));
                }
            }
            SlotKind::Output => {
                // Empty slots have nothing to store or flush.
                if self.slot_data.get(slot).is_none_or(|table| table.is_empty()) {
                    self.slot_data.remove(slot);
                    return Ok(());
                }

                if self.config.store_to_cache
                    && !self.config.disable_cache_nodes.contains(&slot.node)
                {
                    if let (Some(cache), Some(fingerprint), Some(table)) = (
                        self.cache.as_ref(),
                        fingerprints.get(&slot.node),
                        self.slot_data.get(slot),
                    ) {
                        gc_progress.log(format!("Caching output slot {display}"));
                        cache.store(slot.node, fingerprint.clone(), slot.name.clone(), table.clone());
                    }
                }

                if self.config.save_to_disk
                    && !self.config.disable_disk_nodes.contains(&slot.node)
                    && self.config.output_path.is_some()
                {
                    gc_progress.log(format!("Flushing output slot {display}"));
                    self.flush_slot(slot, &node_name, &display)?;
                    gc.mark_flushed(slot);
                }

                if !self.config.persistent_nodes.contains(&slot.node) {
                    gc_progress.log(format!("Clearing output slot {display}"));
                    self.slot_data.remove(slot);
                }
            }
        }
        Ok(())
    }

    /// Writes a slot's table to its storage directory.
    ///
    /// A failure here surfaces as a node execution failure for the slot
    /// being flushed rather than a silent data loss.
    fn flush_slot(&self, slot: &SlotRef, node_name: &str, display: &str) -> RunResult<()> {
        let Some(output) = &self.config.output_path else {
            return Ok(());
        };
        let Some(table) = self.slot_data.get(slot) else {
            return Ok(());
        };
        let dir = output
            .join(self.graph.alias_id_of(slot.node))
            .join(&slot.name);
        let write = || -> RunResult<()> {
            std::fs::create_dir_all(&dir)?;
            let json = serde_json::to_string_pretty(table)?;
            std::fs::write(dir.join("table.json"), json)?;
            Ok(())
        };
        write().map_err(|error| RunError::NodeExecution {
            node: node_name.to_string(),
            path: display.to_string(),
            message: format!("failed to flush slot data: {error}"),
        })
    }

    /// Re-serializes the project definition next to the outputs.
    fn postprocess(&self) -> RunResult<()> {
        self.progress.log("Postprocessing steps ...");
        if let Some(output) = &self.config.output_path {
            if self.config.save_to_disk {
                let definition = self.graph.to_definition();
                let json = serde_json::to_string_pretty(&definition)?;
                std::fs::write(output.join("project.json"), json)?;
            }
        }
        Ok(())
    }

    fn write_log(&self) {
        if let Some(output) = &self.config.output_path {
            if let Err(error) = std::fs::write(output.join("log.txt"), self.progress.snapshot_log())
            {
                tracing::warn!(
                    target: TRACING_TARGET,
                    %error,
                    "Failed to write run log"
                );
            }
        }
    }

    fn set_state(&mut self, state: RunnerState) {
        tracing::debug!(
            target: TRACING_TARGET,
            from = %self.state,
            to = %state,
            "Runner state changed"
        );
        self.state = state;
    }

    fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for GraphRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRunner")
            .field("state", &self.state)
            .field("nodes", &self.graph.node_count())
            .field("pool", &self.pool.size())
            .finish()
    }
}
