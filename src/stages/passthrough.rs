use crate::stage::{
    ControlCommand, ControlReply, Emitter, InputBatch, InputSlot, OutputSlot, OverflowPolicy,
    Scheduling, SlotMap, Stage, DEFAULT_SLOT_CAPACITY,
};
use anyhow::Result;
use mediaflow_macros::StageKind;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Forwards every input buffer unchanged, in arrival order.
#[derive(StageKind, Debug, Clone, Serialize, Deserialize)]
#[stage_meta(name = "Passthrough", category = "Utility", kind = "passthrough")]
#[serde(default)]
pub struct Passthrough {
    #[input(name = "In")]
    #[serde(skip)]
    _in: (),

    #[output(name = "Out")]
    #[serde(skip)]
    _out: (),

    #[param(default = "{\"mode\": \"inline\"}")]
    pub scheduling: Scheduling,

    #[param(default = "4", min = 0.0)]
    pub capacity: usize,

    #[param(default = "\"block\"")]
    pub overflow: OverflowPolicy,

    #[serde(skip)]
    forwarded: u64,
}

impl Passthrough {
    pub fn new(scheduling: Scheduling) -> Self {
        Self {
            scheduling,
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.capacity = capacity;
        self.overflow = overflow;
        self
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self {
            _in: (),
            _out: (),
            scheduling: Scheduling::Inline,
            capacity: DEFAULT_SLOT_CAPACITY,
            overflow: OverflowPolicy::Block,
            forwarded: 0,
        }
    }
}

impl Stage for Passthrough {
    fn slot_map(&self) -> SlotMap {
        SlotMap::new(self.scheduling)
            .input(InputSlot::new("in").capacity(self.capacity).overflow(self.overflow))
            .output(OutputSlot::new("out"))
    }

    fn transform(&mut self, inputs: InputBatch, out: &Emitter<'_>) -> Result<()> {
        // Keep forwarding after a consumer fails; report the first failure
        let mut failure = None;
        for (_, buffer) in inputs.into_buffers() {
            if let Err(e) = out.emit("out", buffer) {
                failure.get_or_insert(e);
            }
            self.forwarded += 1;
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn control(&mut self, command: ControlCommand) -> Result<ControlReply> {
        match command {
            ControlCommand::Get { key } if key == "forwarded" => Ok(ControlReply::Value(json!(self.forwarded))),
            _ => Ok(ControlReply::Unsupported),
        }
    }
}
