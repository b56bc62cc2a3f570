pub mod interruptions;
pub mod sessions;
pub mod stats;
pub mod tasks;
pub mod templates;

pub use interruptions::RecordedInterruption;
