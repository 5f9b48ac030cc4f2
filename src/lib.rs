//! Graph execution engine for media pipelines.
//!
//! Stages exchange reference-counted [`MediaBuffer`]s over edges bound at
//! runtime. Each stage declares input slots with their own queue and
//! overflow policy, and runs its transform either inline on the pushing
//! thread or on a dedicated worker. Out-of-band signals travel on a separate
//! [`EventChannel`].

pub mod buffer;
pub mod config;
mod dispatch;
pub mod error;
pub mod event;
pub mod graph;
pub mod observability;
pub mod registry;
pub mod stage;
pub mod stages;

pub use buffer::{BufferFlags, BufferKind, BufferPool, MediaBuffer, MediaType};
pub use config::{EdgeConfig, EngineConfig, GraphConfig, StageConfig};
pub use error::{FlowError, Result};
pub use event::{EventChannel, EventMessage, EventOrdering};
pub use graph::{Edge, EdgeId, Graph};
pub use registry::StageRegistry;
pub use stage::{
    ControlCommand, ControlReply, Emitter, InputBatch, InputSlot, OutputSlot, OverflowPolicy,
    PushOutcome, Scheduling, SlotMap, Stage, StageHandle, StageState, WorkerDispatch,
};
