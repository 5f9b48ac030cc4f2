use crate::stage::{ControlCommand, ControlReply, Emitter, InputBatch, SlotMap, Stage};
use anyhow::Result;

type TransformFn = Box<dyn FnMut(InputBatch, &Emitter<'_>) -> Result<()> + Send>;
type ControlFn = Box<dyn FnMut(ControlCommand) -> Result<ControlReply> + Send>;

/// Stage assembled at runtime from a slot map and closures.
pub struct FnStage {
    slots: SlotMap,
    transform: Option<TransformFn>,
    control: Option<ControlFn>,
}

impl FnStage {
    pub fn new<F>(slots: SlotMap, transform: F) -> Self
    where
        F: FnMut(InputBatch, &Emitter<'_>) -> Result<()> + Send + 'static,
    {
        Self {
            slots,
            transform: Some(Box::new(transform)),
            control: None,
        }
    }

    /// A stage with no transform; configure rejects it
    pub fn without_transform(slots: SlotMap) -> Self {
        Self {
            slots,
            transform: None,
            control: None,
        }
    }

    pub fn on_control<F>(mut self, control: F) -> Self
    where
        F: FnMut(ControlCommand) -> Result<ControlReply> + Send + 'static,
    {
        self.control = Some(Box::new(control));
        self
    }
}

impl Stage for FnStage {
    fn slot_map(&self) -> SlotMap {
        self.slots.clone()
    }

    fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    fn transform(&mut self, inputs: InputBatch, out: &Emitter<'_>) -> Result<()> {
        match self.transform.as_mut() {
            Some(transform) => transform(inputs, out),
            None => Ok(()),
        }
    }

    fn control(&mut self, command: ControlCommand) -> Result<ControlReply> {
        match self.control.as_mut() {
            Some(control) => control(command),
            None => Ok(ControlReply::Unsupported),
        }
    }
}
