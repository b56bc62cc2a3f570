use serde::Serialize;

use super::TimerState;

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining_secs: i64,
    pub display: String,
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            remaining_secs: state.remaining_secs(),
            display: state.format_elapsed(),
            state: state.clone(),
        }
    }
}

/// Everything the timer tells the UI layer.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimerEvent {
    StateChanged { snapshot: TimerSnapshot },
    Tick { snapshot: TimerSnapshot },
    Halfway { task_id: String, elapsed_secs: u64 },
    NearEnd { task_id: String, remaining_secs: u64 },
    OvertimeStarted { task_id: String },
    DayEnded { task_id: String },
}
