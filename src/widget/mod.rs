//! Mirrors the timer into storage that the home-screen widget reads.
//!
//! Publishing is fire-and-forget: the widget is a passive observer that
//! polls, so the last write wins and failures are only logged.

pub mod shared_file;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use shared_file::{SharedFileSurface, WidgetEntry};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub const KEY_TASK_TITLE: &str = "currentTaskTitle";
pub const KEY_START_TIME: &str = "taskStartTime";
pub const KEY_TOTAL_MINUTES: &str = "taskTotalTime";
pub const KEY_IS_RUNNING: &str = "isRunning";

/// What the widget needs to draw the active task. Absence of `started_at`
/// means there is no active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetState {
    pub task_title: Option<String>,
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub planned_minutes: u32,
}

impl WidgetState {
    pub fn idle() -> Self {
        Self {
            task_title: None,
            is_running: false,
            started_at: None,
            planned_minutes: 0,
        }
    }

    pub fn running(title: &str, started_at: DateTime<Utc>, planned_minutes: u32) -> Self {
        Self {
            task_title: Some(title.to_string()),
            is_running: true,
            started_at: Some(started_at),
            planned_minutes,
        }
    }
}

/// Storage shared with the widget process.
pub trait WidgetSink: Send + Sync {
    fn publish(&self, state: &WidgetState) -> Result<()>;

    /// Asks the widget to re-read its timeline.
    fn request_refresh(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct WidgetStateBridge {
    sink: Arc<dyn WidgetSink>,
}

impl WidgetStateBridge {
    pub fn new(sink: Arc<dyn WidgetSink>) -> Self {
        Self { sink }
    }

    pub fn publish(&self, state: &WidgetState) {
        if let Err(err) = self.sink.publish(state) {
            log_error!("Failed to publish widget state: {err:#}");
            return;
        }
        if let Err(err) = self.sink.request_refresh() {
            log_error!("Failed to request widget refresh: {err:#}");
        }
    }

    pub fn publish_running(&self, title: &str, started_at: DateTime<Utc>, planned_minutes: u32) {
        log_info!("Widget showing '{title}' ({planned_minutes} min)");
        self.publish(&WidgetState::running(title, started_at, planned_minutes));
    }

    pub fn publish_idle(&self) {
        self.publish(&WidgetState::idle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, MemoryWidgetSink};

    #[test]
    fn publishes_and_refreshes() {
        let sink = Arc::new(MemoryWidgetSink::default());
        let bridge = WidgetStateBridge::new(sink.clone());

        bridge.publish_running("Essay", at(0), 30);
        bridge.publish_idle();

        assert_eq!(
            sink.published(),
            vec![WidgetState::running("Essay", at(0), 30), WidgetState::idle()]
        );
        assert_eq!(sink.refreshes(), 2);
    }

    #[test]
    fn skips_refresh_when_publish_fails() {
        let sink = Arc::new(MemoryWidgetSink::failing());
        let bridge = WidgetStateBridge::new(sink.clone());

        bridge.publish_idle();
        assert!(sink.published().is_empty());
        assert_eq!(sink.refreshes(), 0);
    }
}
