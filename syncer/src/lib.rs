#![allow(dead_code)]

pub mod builder;
pub mod processor;
pub mod stats;
pub mod trigger;

pub use builder::TreeBuilder;
pub use processor::ChangeProcessor;
pub use stats::TaskStatsStore;
pub use trigger::{trigger_queue, TriggerHandle, TriggerQueue};
