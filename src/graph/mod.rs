mod binding;
mod edge;

pub use binding::Graph;
pub use edge::{Edge, EdgeId};
