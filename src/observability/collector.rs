use super::{MetricsSnapshot, StageMetrics};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared registry of stage metrics; clones see the same stages
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<BTreeMap<String, Arc<StageMetrics>>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stage: impl Into<String>, metrics: Arc<StageMetrics>) {
        self.metrics.write().insert(stage.into(), metrics);
    }

    pub fn unregister(&self, stage: &str) -> Option<Arc<StageMetrics>> {
        self.metrics.write().remove(stage)
    }

    /// Snapshots keyed and ordered by stage name
    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .read()
            .iter()
            .map(|(stage, metrics)| (stage.clone(), metrics.snapshot()))
            .collect()
    }

    pub fn get_stage_metrics(&self, stage: &str) -> Option<Arc<StageMetrics>> {
        self.metrics.read().get(stage).cloned()
    }
}
