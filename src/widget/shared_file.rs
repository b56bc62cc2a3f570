use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    WidgetSink, WidgetState, KEY_IS_RUNNING, KEY_START_TIME, KEY_TASK_TITLE, KEY_TOTAL_MINUTES,
};
use crate::db::seconds_between;

const KEY_RELOAD_GENERATION: &str = "reloadGeneration";
const NO_ACTIVE_TASK: &str = "No active task";

/// What the widget renders for one timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetEntry {
    pub task_title: String,
    pub elapsed_minutes: u64,
    pub total_minutes: u32,
}

/// Key-value JSON file in a directory both processes can reach.
///
/// Writes go to a sibling temp file and are renamed into place so the reader
/// never sees a half-written document.
pub struct SharedFileSurface {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SharedFileSurface {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create shared directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join("widget_state.json"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; a missing or unreadable file reads as empty.
    pub fn values(&self) -> Map<String, Value> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Map<String, Value>>(&contents).ok())
            .unwrap_or_default()
    }

    pub fn reload_generation(&self) -> u64 {
        self.values()
            .get(KEY_RELOAD_GENERATION)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// The widget's view at `now`, derived from the published start instant.
    pub fn read_entry(&self, now: DateTime<Utc>) -> WidgetEntry {
        let values = self.values();
        let started_at = values
            .get(KEY_START_TIME)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        match started_at {
            Some(started_at) => WidgetEntry {
                task_title: values
                    .get(KEY_TASK_TITLE)
                    .and_then(Value::as_str)
                    .unwrap_or(NO_ACTIVE_TASK)
                    .to_string(),
                elapsed_minutes: seconds_between(started_at, now) / 60,
                total_minutes: values
                    .get(KEY_TOTAL_MINUTES)
                    .and_then(Value::as_u64)
                    .and_then(|minutes| u32::try_from(minutes).ok())
                    .unwrap_or(0),
            },
            None => WidgetEntry {
                task_title: NO_ACTIVE_TASK.to_string(),
                elapsed_minutes: 0,
                total_minutes: 0,
            },
        }
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut values = self.values();
        mutate(&mut values);

        let serialized = serde_json::to_string_pretty(&values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to move widget state into {}", self.path.display()))
    }
}

impl WidgetSink for SharedFileSurface {
    fn publish(&self, state: &WidgetState) -> Result<()> {
        self.update(|values| {
            values.insert(KEY_IS_RUNNING.into(), Value::Bool(state.is_running));
            match (&state.task_title, state.started_at) {
                (Some(title), Some(started_at)) if state.is_running => {
                    values.insert(KEY_TASK_TITLE.into(), Value::String(title.clone()));
                    values.insert(
                        KEY_START_TIME.into(),
                        Value::String(started_at.to_rfc3339()),
                    );
                    values.insert(
                        KEY_TOTAL_MINUTES.into(),
                        Value::from(state.planned_minutes),
                    );
                }
                _ => {
                    values.remove(KEY_TASK_TITLE);
                    values.remove(KEY_START_TIME);
                    values.remove(KEY_TOTAL_MINUTES);
                }
            }
        })
    }

    fn request_refresh(&self) -> Result<()> {
        self.update(|values| {
            let next = values
                .get(KEY_RELOAD_GENERATION)
                .and_then(Value::as_u64)
                .unwrap_or(0)
                + 1;
            values.insert(KEY_RELOAD_GENERATION.into(), Value::from(next));
        })
    }
}
