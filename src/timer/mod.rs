pub mod controller;
pub mod events;
pub mod handle;
pub mod state;

pub use controller::{SessionTimer, TimerConfig};
pub use events::{TimerEvent, TimerSnapshot};
pub use handle::TimerHandle;
pub use state::{format_elapsed, Threshold, TimerState, TimerStatus};
