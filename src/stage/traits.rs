use super::handle::Emitter;
use super::slot::{SlotId, SlotMap};
use crate::buffer::MediaBuffer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contract every stage implements.
///
/// A stage declares its slots once through [`Stage::slot_map`]; the engine
/// queues pushes per input slot and calls [`Stage::transform`] with whatever
/// is newly available, either inline or on the stage's worker thread.
pub trait Stage: Send {
    /// Slot layout and scheduling; read once at configure time
    fn slot_map(&self) -> SlotMap;

    /// One-time setup before configure
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stages assembled at runtime may lack a transform; configure refuses those
    fn has_transform(&self) -> bool {
        true
    }

    /// Consume newly available inputs, emit zero or more outputs
    fn transform(&mut self, inputs: InputBatch, out: &Emitter<'_>) -> Result<()>;

    /// Out-of-band reconfiguration; the engine forwards without interpreting
    fn control(&mut self, _command: ControlCommand) -> Result<ControlReply> {
        Ok(ControlReply::Unsupported)
    }

    /// Called once after the stage stops processing
    fn teardown(&mut self) {}
}

/// Runtime reconfiguration commands with typed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    SetBitrate { bits_per_second: u32 },
    SetFrameRate { numerator: u32, denominator: u32 },
    RequestKeyFrame,
    SetRegion { x: u32, y: u32, width: u32, height: u32 },
    /// Fallback for stage-specific options
    Set { key: String, value: Value },
    Get { key: String },
}

impl ControlCommand {
    pub fn name(&self) -> &str {
        match self {
            Self::SetBitrate { .. } => "set_bitrate",
            Self::SetFrameRate { .. } => "set_frame_rate",
            Self::RequestKeyFrame => "request_key_frame",
            Self::SetRegion { .. } => "set_region",
            Self::Set { .. } => "set",
            Self::Get { .. } => "get",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
    Done,
    Value(Value),
    Unsupported,
}

/// Buffers newly available on a stage's input slots, per slot in push order.
#[derive(Debug, Default)]
pub struct InputBatch {
    slots: Vec<(SlotId, Vec<MediaBuffer>)>,
}

impl InputBatch {
    pub fn new(slots: Vec<(SlotId, Vec<MediaBuffer>)>) -> Self {
        Self { slots }
    }

    /// Batch holding one buffer on one slot
    pub fn single(slot: SlotId, buffer: MediaBuffer) -> Self {
        Self {
            slots: vec![(slot, vec![buffer])],
        }
    }

    pub fn get(&self, slot: &str) -> &[MediaBuffer] {
        self.slots
            .iter()
            .find(|(id, _)| id.as_str() == slot)
            .map(|(_, buffers)| buffers.as_slice())
            .unwrap_or(&[])
    }

    pub fn take(&mut self, slot: &str) -> Vec<MediaBuffer> {
        self.slots
            .iter_mut()
            .find(|(id, _)| id.as_str() == slot)
            .map(|(_, buffers)| std::mem::take(buffers))
            .unwrap_or_default()
    }

    pub fn latest(&self, slot: &str) -> Option<&MediaBuffer> {
        self.get(slot).last()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &[MediaBuffer])> {
        self.slots.iter().map(|(id, buffers)| (id, buffers.as_slice()))
    }

    /// Flatten into (slot, buffer) pairs, slot by slot
    pub fn into_buffers(self) -> impl Iterator<Item = (SlotId, MediaBuffer)> {
        self.slots
            .into_iter()
            .flat_map(|(id, buffers)| buffers.into_iter().map(move |b| (id.clone(), b)))
    }

    /// Total buffers across all slots
    pub fn len(&self) -> usize {
        self.slots.iter().map(|(_, buffers)| buffers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
