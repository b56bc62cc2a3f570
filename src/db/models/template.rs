use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reusable task the user plans often, instantiated onto a day on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: String,
    pub title: String,
    pub estimated_minutes: u32,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInput {
    pub title: String,
    pub estimated_minutes: u32,
    pub display_order: i64,
}
