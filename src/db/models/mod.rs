pub mod interruption;
pub mod session;
pub mod stats;
pub mod task;
pub mod template;

pub use interruption::{Interruption, InterruptionReason};
pub use session::Session;
pub use stats::{FocusSummary, InterruptionSummary, ReasonCount};
pub use task::{Task, TaskInput, TaskStatus};
pub use template::{TaskTemplate, TemplateInput};
