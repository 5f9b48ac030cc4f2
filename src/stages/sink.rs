use crate::stage::{
    ControlCommand, ControlReply, Emitter, InputBatch, InputSlot, OverflowPolicy, Scheduling,
    SlotMap, Stage, DEFAULT_SLOT_CAPACITY,
};
use anyhow::Result;
use mediaflow_macros::StageKind;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Releases everything it receives.
#[derive(StageKind, Debug, Clone, Serialize, Deserialize)]
#[stage_meta(name = "Null Sink", category = "Sinks", kind = "null_sink")]
#[serde(default)]
pub struct NullSink {
    #[input(name = "In")]
    #[serde(skip)]
    _in: (),

    #[param(default = "{\"mode\": \"inline\"}")]
    pub scheduling: Scheduling,

    #[param(default = "4", min = 0.0)]
    pub capacity: usize,

    #[param(default = "\"block\"")]
    pub overflow: OverflowPolicy,

    #[serde(skip)]
    consumed: u64,
}

impl Default for NullSink {
    fn default() -> Self {
        Self {
            _in: (),
            scheduling: Scheduling::Inline,
            capacity: DEFAULT_SLOT_CAPACITY,
            overflow: OverflowPolicy::Block,
            consumed: 0,
        }
    }
}

impl Stage for NullSink {
    fn slot_map(&self) -> SlotMap {
        SlotMap::new(self.scheduling)
            .input(InputSlot::new("in").capacity(self.capacity).overflow(self.overflow))
    }

    fn transform(&mut self, inputs: InputBatch, _out: &Emitter<'_>) -> Result<()> {
        self.consumed += inputs.len() as u64;
        Ok(())
    }

    fn control(&mut self, command: ControlCommand) -> Result<ControlReply> {
        match command {
            ControlCommand::Get { key } if key == "consumed" => Ok(ControlReply::Value(json!(self.consumed))),
            _ => Ok(ControlReply::Unsupported),
        }
    }
}
