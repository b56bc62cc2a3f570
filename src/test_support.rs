//! Fakes and fixtures shared by the unit tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::{
    clock::Clock,
    db::{Database, Task, TaskInput},
    settings::SettingsStore,
    store::SessionStore,
    voice::VoicePrompt,
    widget::{WidgetSink, WidgetState},
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn temp_store() -> (TempDir, SessionStore) {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("focusbuddy.sqlite3")).unwrap();
    (dir, SessionStore::new(db))
}

pub fn temp_settings(dir: &TempDir) -> Arc<SettingsStore> {
    Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap())
}

pub async fn new_task(store: &SessionStore, title: &str, estimated_minutes: u32) -> Task {
    store
        .database()
        .create_task(
            TaskInput {
                title: title.to_string(),
                estimated_minutes,
                planned_date: Some(t0().date_naive()),
                display_order: 0,
            },
            t0(),
        )
        .await
        .unwrap()
}

#[derive(Default)]
pub struct MemoryWidgetSink {
    published: Mutex<Vec<WidgetState>>,
    refreshes: AtomicUsize,
    failing: bool,
}

impl MemoryWidgetSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<WidgetState> {
        self.published.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<WidgetState> {
        self.published.lock().unwrap().last().cloned()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl WidgetSink for MemoryWidgetSink {
    fn publish(&self, state: &WidgetState) -> Result<()> {
        if self.failing {
            bail!("shared storage unavailable");
        }
        self.published.lock().unwrap().push(state.clone());
        Ok(())
    }

    fn request_refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingVoice {
    spoken: Mutex<Vec<String>>,
}

impl RecordingVoice {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl VoicePrompt for RecordingVoice {
    fn announce(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}
