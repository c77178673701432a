mod orchestrator;
mod pipeline;
mod task;

pub use orchestrator::Orchestrator;
pub use pipeline::{AckPolicy, Pipeline};
pub use task::{complete, dispatch, Dispatched};
