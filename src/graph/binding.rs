use super::edge::{Edge, EdgeId, EdgeRecord};
use crate::buffer::MediaBuffer;
use crate::config::{EngineConfig, GraphConfig};
use crate::error::{FlowError, Result};
use crate::event::EventChannel;
use crate::observability::{GraphMonitor, MetricsCollector};
use crate::registry::StageRegistry;
use crate::stage::handle::EdgeTarget;
use crate::stage::{ControlCommand, ControlReply, PushOutcome, Stage, StageHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Named stages plus the edges between them.
///
/// Stages run on their own; the graph only owns the wiring. Bind and unbind
/// may happen while buffers are flowing.
pub struct Graph {
    stages: RwLock<HashMap<String, StageHandle>>,
    edges: Mutex<BTreeMap<EdgeId, EdgeRecord>>,
    next_edge: AtomicU64,
    events: EventChannel,
    metrics: MetricsCollector,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            stages: RwLock::new(HashMap::new()),
            edges: Mutex::new(BTreeMap::new()),
            next_edge: AtomicU64::new(1),
            events: EventChannel::new(config.event_queue_limit),
            metrics: MetricsCollector::new(),
        }
    }

    /// Instantiate every stage through the registry, then bind every edge
    pub fn from_config(config: &GraphConfig, registry: &StageRegistry) -> Result<Self> {
        let graph = Self::with_config(&config.engine);

        for stage_config in &config.stages {
            let stage = registry.create(stage_config)?;
            graph.add_stage(&stage_config.name, stage)?;
        }

        for edge in &config.edges {
            graph.bind(&edge.producer, &edge.output, &edge.consumer, &edge.input)?;
        }

        tracing::info!(
            "Graph built: {} stage(s), {} edge(s)",
            config.stages.len(),
            config.edges.len()
        );
        Ok(graph)
    }

    /// Add and configure a stage.
    ///
    /// A stage that fails to configure stays in the graph as `Invalid` so
    /// later binds report it, and the configure error is returned.
    pub fn add_stage(&self, name: &str, stage: Box<dyn Stage>) -> Result<StageHandle> {
        let handle = {
            let mut stages = self.stages.write();
            if stages.contains_key(name) {
                return Err(FlowError::StageAlreadyExists(name.to_string()));
            }
            let handle = StageHandle::new(name, stage);
            handle.set_event_sender(self.events.sender());
            stages.insert(name.to_string(), handle.clone());
            handle
        };

        self.metrics.register(name, handle.metrics());
        handle.configure()?;
        Ok(handle)
    }

    /// Unbind every edge touching the stage, stop it and forget it
    pub fn remove_stage(&self, name: &str) -> Result<()> {
        let handle = self
            .stages
            .write()
            .remove(name)
            .ok_or_else(|| FlowError::StageNotFound(name.to_string()))?;

        let touching: Vec<EdgeRecord> = {
            let mut edges = self.edges.lock();
            let ids: Vec<EdgeId> = edges
                .values()
                .filter(|r| r.edge.producer == name || r.edge.consumer == name)
                .map(|r| r.edge.id)
                .collect();
            ids.iter().filter_map(|id| edges.remove(id)).collect()
        };
        for record in &touching {
            record.detach();
        }

        handle.stop();
        self.metrics.unregister(name);
        tracing::debug!("Removed stage '{}' ({} edge(s))", name, touching.len());
        Ok(())
    }

    pub fn stage(&self, name: &str) -> Option<StageHandle> {
        self.stages.read().get(name).cloned()
    }

    fn require(&self, name: &str) -> Result<StageHandle> {
        self.stage(name)
            .ok_or_else(|| FlowError::StageNotFound(name.to_string()))
    }

    pub fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connect `producer.output` to `consumer.input`.
    ///
    /// Both stages must be configured and live, the slot media types must be
    /// compatible, the edge must be new, and the graph must stay acyclic.
    pub fn bind(&self, producer: &str, output: &str, consumer: &str, input: &str) -> Result<EdgeId> {
        let from = self.require(producer)?;
        let to = self.require(consumer)?;
        from.core().is_bindable()?;
        to.core().is_bindable()?;

        let out_index = from.core().output_index(output)?;
        let in_index = to.core().input_index(input)?;
        let (Some(out_slot), Some(in_slot)) =
            (from.core().output_slot(out_index), to.core().input_slot(in_index))
        else {
            return Err(FlowError::UnknownSlot {
                stage: producer.to_string(),
                slot: output.to_string(),
            });
        };
        if !in_slot.accepts_type(out_slot.produces) {
            return Err(FlowError::IncompatibleEdge(format!(
                "{}.{} produces {} but {}.{} accepts {:?}",
                producer, output, out_slot.produces, consumer, input, in_slot.accepts
            )));
        }
        let edge_name = format!("{}.{} -> {}.{}", producer, output, consumer, input);

        let mut edges = self.edges.lock();
        if edges
            .values()
            .any(|r| r.edge.connects(producer, output, consumer, input))
        {
            return Err(FlowError::EdgeAlreadyExists(edge_name));
        }
        if Self::reaches(&edges, consumer, producer) {
            return Err(FlowError::Cycle(edge_name));
        }

        let id = EdgeId(self.next_edge.fetch_add(1, Ordering::Relaxed));
        from.core().attach_output(
            out_index,
            EdgeTarget {
                edge: id,
                consumer: to.core().clone(),
                input: in_index,
            },
        )?;
        from.core().edge_added();
        to.core().edge_added();

        edges.insert(
            id,
            EdgeRecord {
                edge: Edge {
                    id,
                    producer: producer.to_string(),
                    output: out_slot.id.clone(),
                    consumer: consumer.to_string(),
                    input: in_slot.id.clone(),
                },
                producer: from,
                consumer: to,
            },
        );
        tracing::debug!("Bound edge {}: {}", id, edge_name);
        Ok(id)
    }

    /// Remove one edge. Buffers already queued at the consumer still get processed.
    pub fn unbind(&self, id: EdgeId) -> Result<Edge> {
        let record = self.edges.lock().remove(&id).ok_or(FlowError::EdgeNotFound(id.raw()))?;
        record.detach();
        tracing::debug!("Unbound edge {}: {}", id, record.edge);
        Ok(record.edge)
    }

    /// True when `to` is reachable from `from` (or they are the same stage)
    fn reaches(edges: &BTreeMap<EdgeId, EdgeRecord>, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(stage) = stack.pop() {
            if stage == to {
                return true;
            }
            if !seen.insert(stage) {
                continue;
            }
            stack.extend(
                edges
                    .values()
                    .filter(|r| r.edge.producer == stage)
                    .map(|r| r.edge.consumer.as_str()),
            );
        }
        false
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.edges.lock().values().map(|r| r.edge.clone()).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }

    pub fn push(&self, stage: &str, slot: &str, buffer: MediaBuffer) -> Result<PushOutcome> {
        self.require(stage)?.push(slot, buffer)
    }

    pub fn emit(&self, stage: &str, slot: &str, buffer: MediaBuffer) -> Result<()> {
        self.require(stage)?.emit(slot, buffer)
    }

    pub fn control(&self, stage: &str, command: ControlCommand) -> Result<ControlReply> {
        self.require(stage)?.control(command)
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn monitor(&self) -> GraphMonitor {
        GraphMonitor::new(self.metrics.clone())
    }

    /// Producers before consumers; stages outside any edge come last, by name
    fn topological_order(&self) -> Vec<StageHandle> {
        let stages = self.stages.read();
        let edges = self.edges.lock();

        let mut indegree: BTreeMap<&str, usize> = stages.keys().map(|n| (n.as_str(), 0)).collect();
        for record in edges.values() {
            if let Some(count) = indegree.get_mut(record.edge.consumer.as_str()) {
                *count += 1;
            }
        }

        let mut ready: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(stages.len());
        while let Some(name) = ready.pop_front() {
            order.push(name);
            for record in edges.values().filter(|r| r.edge.producer == name) {
                if let Some(count) = indegree.get_mut(record.edge.consumer.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(record.edge.consumer.as_str());
                    }
                }
            }
        }

        order
            .into_iter()
            .filter_map(|name| stages.get(name).cloned())
            .collect()
    }

    /// Stop every stage, producers first, and drop all edges. Idempotent.
    pub fn stop(&self) {
        let order = self.topological_order();

        let records: Vec<EdgeRecord> = std::mem::take(&mut *self.edges.lock()).into_values().collect();
        for record in &records {
            record.detach();
        }

        for stage in &order {
            stage.stop();
        }
        if !order.is_empty() {
            tracing::info!("Graph stopped: {} stage(s), {} edge(s) released", order.len(), records.len());
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.stop();
        self.events.unregister_hook();
    }
}
