pub mod anchor;
pub mod processor;
pub mod task_tracker;
pub mod worker;

pub use anchor::{fetch_anchor, AnchorReference};
pub use processor::Processor;
pub use task_tracker::TaskTracker;
pub use worker::Worker;
