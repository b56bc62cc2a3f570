//! Session-related data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One continuous attempt at a task. `end_time == None` marks the open session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub task_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub planned_minutes: u32,
    pub actual_duration_secs: u64,
    pub is_completed: bool,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}
