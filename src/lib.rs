pub mod clock;
pub mod db;
pub mod rollover;
pub mod settings;
pub mod store;
pub mod timer;
mod utils;
pub mod voice;
pub mod widget;

#[cfg(test)]
mod test_support;

use std::{env, fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use log::info;

use clock::{Clock, SystemClock};
use db::Database;
use rollover::DayRolloverGuard;
use settings::SettingsStore;
use store::SessionStore;
use timer::{SessionTimer, TimerConfig, TimerHandle};
use voice::{LogVoicePrompt, VoicePrompt};
use widget::{SharedFileSurface, WidgetStateBridge};

/// Initializes logging from `RUST_LOG`, defaulting to `info`. Safe to call
/// more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Directory shared with the widget process.
    pub shared_dir: PathBuf,
    pub debug: bool,
}

impl AppConfig {
    pub fn new(data_dir: PathBuf, shared_dir: PathBuf) -> Self {
        Self {
            data_dir,
            shared_dir,
            debug: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        let debug = env::var("FOCUSBUDDY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let dirs = ProjectDirs::from("app", "FocusBuddy", "FocusBuddy");
        let data_dir = match env::var_os("FOCUSBUDDY_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs
                .as_ref()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| anyhow!("could not determine a data directory"))?,
        };
        let shared_dir = match env::var_os("FOCUSBUDDY_SHARED_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => data_dir.join("shared"),
        };

        Ok(Self {
            data_dir,
            shared_dir,
            debug,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("focusbuddy.sqlite3")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    fn timer_config(&self) -> TimerConfig {
        if self.debug {
            TimerConfig::debug()
        } else {
            TimerConfig::default()
        }
    }
}

pub struct AppState {
    pub db: Database,
    pub store: SessionStore,
    pub timer: SessionTimer,
    pub settings: Arc<SettingsStore>,
    pub rollover: DayRolloverGuard,
    pub widget_surface: Arc<SharedFileSurface>,
    /// Keeps the midnight sweep alive; dropping the state cancels it.
    pub midnight_sweep: TimerHandle,
}

/// Opens storage, repairs runs left by a previous process and wires up the
/// timer. Must be called inside a tokio runtime.
pub async fn bootstrap(config: AppConfig) -> Result<AppState> {
    bootstrap_with(config, Arc::new(SystemClock), Arc::new(LogVoicePrompt)).await
}

pub async fn bootstrap_with(
    config: AppConfig,
    clock: Arc<dyn Clock>,
    voice: Arc<dyn VoicePrompt>,
) -> Result<AppState> {
    fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    let db = Database::new(config.database_path())?;
    let store = SessionStore::new(db.clone());
    let settings = Arc::new(SettingsStore::new(config.settings_path())?);

    // No timer survives process death; anything still in progress is stale.
    let rollover = DayRolloverGuard::new(store.clone(), clock.clone());
    rollover.recover_on_launch().await?;

    let widget_surface = Arc::new(SharedFileSurface::new(&config.shared_dir)?);
    let widget = WidgetStateBridge::new(widget_surface.clone());
    widget.publish_idle();

    let timer = SessionTimer::new(
        store.clone(),
        clock,
        widget,
        voice,
        settings.clone(),
        config.timer_config(),
    );
    let midnight_sweep = rollover.schedule_midnight_sweep();

    info!("FocusBuddy core ready (data in {})", config.data_dir.display());

    Ok(AppState {
        db,
        store,
        timer,
        settings,
        rollover,
        widget_surface,
        midnight_sweep,
    })
}

#[cfg(test)]
mod bootstrap_tests {
    use super::*;
    use crate::db::TaskStatus;
    use crate::test_support::{at, new_task, ManualClock, RecordingVoice};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        AppConfig::new(dir.path().join("data"), dir.path().join("shared"))
    }

    #[tokio::test]
    async fn recovers_stale_tasks_and_clears_the_widget() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let task_id = {
            let state = bootstrap_with(
                config.clone(),
                Arc::new(ManualClock::new(at(0))),
                Arc::new(RecordingVoice::default()),
            )
            .await
            .unwrap();
            let task = new_task(&state.store, "Essay", 30).await;
            state.timer.start(&task.id, 30).await.unwrap();
            assert!(state.widget_surface.values().contains_key(widget::KEY_START_TIME));
            state.timer.shutdown().await;
            task.id
        };

        let state = bootstrap_with(
            config,
            Arc::new(ManualClock::new(at(600))),
            Arc::new(RecordingVoice::default()),
        )
        .await
        .unwrap();

        let task = state.store.load_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Interrupted);
        assert_eq!(task.end_time, Some(at(600)));
        assert!(!state.widget_surface.values().contains_key(widget::KEY_START_TIME));
        assert!(!state.midnight_sweep.is_cancelled());
    }

    #[test]
    fn config_paths_live_under_the_data_dir() {
        let config = AppConfig::new(PathBuf::from("/tmp/fb"), PathBuf::from("/tmp/fb-shared"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/fb/focusbuddy.sqlite3"));
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/fb/settings.json"));
        assert_eq!(config.timer_config().heartbeat_every_ticks, 60);
    }
}
