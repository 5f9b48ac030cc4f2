//! Event path for signals that must not wait behind media buffers:
//! end-of-stream, stage failures, detections.

mod channel;
mod message;

pub use channel::{EventChannel, EventSender};
pub use message::{ids, EventMessage, EventOrdering};
