//! Stage contract, slot declarations and the runtime handle.

pub mod handle;
pub(crate) mod queue;
pub mod slot;
pub mod state;
pub mod traits;

pub use handle::{Emitter, StageHandle};
pub use slot::{
    InputSlot, OutputSlot, OverflowPolicy, PushOutcome, Scheduling, SlotId, SlotMap, WorkerDispatch,
    DEFAULT_SLOT_CAPACITY,
};
pub use state::StageState;
pub use traits::{ControlCommand, ControlReply, InputBatch, Stage};
