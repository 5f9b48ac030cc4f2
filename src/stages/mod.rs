//! Built-in stage kinds.

mod closure;
mod collector;
mod passthrough;
mod sink;
mod source;

pub use closure::FnStage;
pub use collector::{Collected, CollectorSink};
pub use passthrough::Passthrough;
pub use sink::NullSink;
pub use source::ManualSource;
