use crate::stage::{SlotId, StageHandle};
use serde::Serialize;
use std::fmt;

/// Identifies one binding; never reused within a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EdgeId(pub(crate) u64);

impl EdgeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directed binding from a producer's output slot to a consumer's input slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub producer: String,
    pub output: SlotId,
    pub consumer: String,
    pub input: SlotId,
}

impl Edge {
    pub(crate) fn connects(&self, producer: &str, output: &str, consumer: &str, input: &str) -> bool {
        self.producer == producer
            && self.output.as_str() == output
            && self.consumer == consumer
            && self.input.as_str() == input
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.producer, self.output, self.consumer, self.input
        )
    }
}

/// Edge plus the handles it keeps wired
pub(crate) struct EdgeRecord {
    pub edge: Edge,
    pub producer: StageHandle,
    pub consumer: StageHandle,
}

impl EdgeRecord {
    /// Stop delivery through this edge and release the endpoints' edge counts
    pub fn detach(&self) {
        self.producer.core().detach_output(self.edge.id);
        self.producer.core().edge_removed();
        self.consumer.core().edge_removed();
    }
}
