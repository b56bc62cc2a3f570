//! Interruption data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the user stepped away. Built-in reasons are stored by label; anything
/// else round-trips as a user-defined custom reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum InterruptionReason {
    Rest,
    Phone,
    Bathroom,
    Water,
    Emergency,
    Other,
    Custom(String),
}

impl InterruptionReason {
    pub const BUILT_IN: [InterruptionReason; 6] = [
        InterruptionReason::Rest,
        InterruptionReason::Phone,
        InterruptionReason::Bathroom,
        InterruptionReason::Water,
        InterruptionReason::Emergency,
        InterruptionReason::Other,
    ];

    pub fn label(&self) -> &str {
        match self {
            InterruptionReason::Rest => "Rest",
            InterruptionReason::Phone => "Phone call",
            InterruptionReason::Bathroom => "Bathroom",
            InterruptionReason::Water => "Water",
            InterruptionReason::Emergency => "Emergency",
            InterruptionReason::Other => "Other",
            InterruptionReason::Custom(label) => label,
        }
    }

    pub fn is_built_in(&self) -> bool {
        !matches!(self, InterruptionReason::Custom(_))
    }
}

impl From<String> for InterruptionReason {
    fn from(value: String) -> Self {
        InterruptionReason::BUILT_IN
            .iter()
            .find(|reason| reason.label() == value)
            .cloned()
            .unwrap_or(InterruptionReason::Custom(value))
    }
}

impl From<&str> for InterruptionReason {
    fn from(value: &str) -> Self {
        InterruptionReason::from(value.to_string())
    }
}

impl From<InterruptionReason> for String {
    fn from(reason: InterruptionReason) -> Self {
        match reason {
            InterruptionReason::Custom(label) => label,
            other => other.label().to_string(),
        }
    }
}

/// A recorded pause-for-a-reason inside a session.
///
/// The interruption is open while `end_time` is `None`; `duration_secs` is
/// derived from `end_time - start_time` when it is closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interruption {
    pub id: String,
    pub session_id: String,
    pub reason: InterruptionReason,
    pub note: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: u64,
}

impl Interruption {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_labels_parse_back() {
        for reason in InterruptionReason::BUILT_IN {
            let label = String::from(reason.clone());
            assert_eq!(InterruptionReason::from(label), reason);
        }
    }

    #[test]
    fn unknown_label_becomes_custom() {
        let reason = InterruptionReason::from("Doorbell");
        assert_eq!(reason, InterruptionReason::Custom("Doorbell".into()));
        assert!(!reason.is_built_in());
        assert_eq!(reason.label(), "Doorbell");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&InterruptionReason::Phone).unwrap();
        assert_eq!(json, "\"Phone call\"");
        let back: InterruptionReason = serde_json::from_str("\"Tea\"").unwrap();
        assert_eq!(back, InterruptionReason::Custom("Tea".into()));
    }
}
