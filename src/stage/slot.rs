use crate::buffer::MediaType;
use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Name of an input or output slot, unique within its direction on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SlotId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SlotId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an input slot does when a push arrives and its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits for space
    #[default]
    Block,
    /// Discard the oldest queued buffer, keep the new one
    DropOldest,
    /// Discard the incoming buffer
    DropNewest,
}

/// Result of a successful push; drops are reported, never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    DroppedOldest,
    DroppedNewest,
}

pub const DEFAULT_SLOT_CAPACITY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub id: SlotId,
    /// 0 means unbounded
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Worker dispatch waits until this slot holds data
    #[serde(default = "default_wait")]
    pub wait_for_data: bool,
    /// Empty accepts every media type
    #[serde(default)]
    pub accepts: Vec<MediaType>,
}

fn default_capacity() -> usize {
    DEFAULT_SLOT_CAPACITY
}

fn default_wait() -> bool {
    true
}

impl InputSlot {
    pub fn new(id: impl Into<SlotId>) -> Self {
        Self {
            id: id.into(),
            capacity: DEFAULT_SLOT_CAPACITY,
            overflow: OverflowPolicy::Block,
            wait_for_data: true,
            accepts: Vec::new(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Polled by the worker and skipped when empty
    pub fn non_blocking(mut self) -> Self {
        self.wait_for_data = false;
        self
    }

    pub fn accepts(mut self, types: impl IntoIterator<Item = MediaType>) -> Self {
        self.accepts = types.into_iter().collect();
        self
    }

    pub fn accepts_type(&self, media_type: MediaType) -> bool {
        self.accepts.is_empty() || self.accepts.contains(&media_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub id: SlotId,
    #[serde(default)]
    pub produces: MediaType,
}

impl OutputSlot {
    pub fn new(id: impl Into<SlotId>) -> Self {
        Self {
            id: id.into(),
            produces: MediaType::Opaque,
        }
    }

    pub fn produces(mut self, media_type: MediaType) -> Self {
        self.produces = media_type;
        self
    }
}

/// How a worker stage turns pushes into transform calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerDispatch {
    /// Coalesced wake; one dispatch takes everything queued
    #[default]
    Common,
    /// One dispatch per accepted push, one buffer each
    Atomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "dispatch")]
pub enum Scheduling {
    /// Transform runs on the pushing thread
    #[default]
    Inline,
    /// Transform runs on the stage's own worker thread
    Worker(WorkerDispatch),
}

impl Scheduling {
    pub fn worker() -> Self {
        Self::Worker(WorkerDispatch::Common)
    }

    pub fn atomic() -> Self {
        Self::Worker(WorkerDispatch::Atomic)
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Self::Worker(_))
    }
}

/// Slot layout and scheduling model of a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotMap {
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    #[serde(default)]
    pub outputs: Vec<OutputSlot>,
    #[serde(default)]
    pub scheduling: Scheduling,
}

impl SlotMap {
    pub fn new(scheduling: Scheduling) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            scheduling,
        }
    }

    pub fn input(mut self, slot: InputSlot) -> Self {
        self.inputs.push(slot);
        self
    }

    pub fn output(mut self, slot: OutputSlot) -> Self {
        self.outputs.push(slot);
        self
    }

    pub fn input_index(&self, id: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.id.as_str() == id)
    }

    pub fn output_index(&self, id: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.id.as_str() == id)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for slot in &self.inputs {
            if !seen.insert(slot.id.as_str()) {
                return Err(FlowError::InvalidSlotMap(format!(
                    "duplicate input slot '{}'",
                    slot.id
                )));
            }
        }

        seen.clear();
        for slot in &self.outputs {
            if !seen.insert(slot.id.as_str()) {
                return Err(FlowError::InvalidSlotMap(format!(
                    "duplicate output slot '{}'",
                    slot.id
                )));
            }
        }

        if self.inputs.is_empty() && self.outputs.is_empty() {
            return Err(FlowError::InvalidSlotMap("stage declares no slots".to_string()));
        }

        if self.scheduling.is_worker() && self.inputs.is_empty() {
            return Err(FlowError::InvalidSlotMap(
                "worker scheduling needs at least one input slot".to_string(),
            ));
        }

        Ok(())
    }
}
