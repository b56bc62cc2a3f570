mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use helpers::seconds_between;
pub use models::{
    FocusSummary, Interruption, InterruptionReason, InterruptionSummary, ReasonCount, Session,
    Task, TaskInput, TaskStatus, TaskTemplate, TemplateInput,
};
pub use repositories::RecordedInterruption;
