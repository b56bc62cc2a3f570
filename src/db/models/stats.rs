//! Aggregated history models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasonCount {
    pub reason: String,
    pub count: u32,
}

/// Interruption totals across all sessions, reasons sorted by count descending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterruptionSummary {
    pub total_count: u32,
    pub total_secs: u64,
    pub average_secs: u64,
    pub by_reason: Vec<ReasonCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSummary {
    pub session_count: u32,
    pub total_focus_secs: u64,
    pub completed_tasks: u32,
    pub total_tasks: u32,
}

impl FocusSummary {
    pub fn completion_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.completed_tasks as f64 / self.total_tasks as f64
        }
    }
}
