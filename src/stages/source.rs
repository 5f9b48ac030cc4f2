use crate::buffer::MediaType;
use crate::stage::{Emitter, InputBatch, OutputSlot, Scheduling, SlotMap, Stage};
use anyhow::Result;
use mediaflow_macros::StageKind;
use serde::{Deserialize, Serialize};

/// Output-only stage fed by the application through `StageHandle::emit`.
#[derive(StageKind, Debug, Clone, Default, Serialize, Deserialize)]
#[stage_meta(name = "Manual Source", category = "Sources", kind = "manual_source")]
#[serde(default)]
pub struct ManualSource {
    #[output(name = "Out")]
    #[serde(skip)]
    _out: (),

    #[param(default = "\"opaque\"")]
    pub media_type: MediaType,
}

impl ManualSource {
    pub fn new(media_type: MediaType) -> Self {
        Self { _out: (), media_type }
    }
}

impl Stage for ManualSource {
    fn slot_map(&self) -> SlotMap {
        SlotMap::new(Scheduling::Inline).output(OutputSlot::new("out").produces(self.media_type))
    }

    // No inputs, so never dispatched
    fn transform(&mut self, _inputs: InputBatch, _out: &Emitter<'_>) -> Result<()> {
        Ok(())
    }
}
