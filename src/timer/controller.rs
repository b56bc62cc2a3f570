use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::{broadcast, Mutex};

use crate::{
    clock::Clock,
    db::{InterruptionReason, TaskStatus},
    rollover,
    settings::SettingsStore,
    store::SessionStore,
    voice::{self, VoicePrompt},
    widget::WidgetStateBridge,
};

use super::{Threshold, TimerEvent, TimerHandle, TimerSnapshot, TimerState, TimerStatus};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct TimerConfig {
    pub tick_interval: Duration,
    /// Actual time is saved to the task every this many ticks while running.
    pub heartbeat_every_ticks: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: 60,
        }
    }
}

impl TimerConfig {
    pub fn debug() -> Self {
        Self {
            heartbeat_every_ticks: 1,
            ..Self::default()
        }
    }
}

struct Inner {
    state: TimerState,
    title: Option<String>,
    ticks: u32,
    ticker: Option<TimerHandle>,
    day_end: Option<TimerHandle>,
}

struct Shared {
    inner: Mutex<Inner>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    widget: WidgetStateBridge,
    voice: Arc<dyn VoicePrompt>,
    settings: Arc<SettingsStore>,
    events: broadcast::Sender<TimerEvent>,
    config: TimerConfig,
}

/// The focus timer: one run at a time, driven by UI commands and its own
/// 1 Hz recompute loop.
///
/// Every command and tick takes the same lock, so mutations of the run and
/// of its task records happen one at a time in the order they arrive.
#[derive(Clone)]
pub struct SessionTimer {
    shared: Arc<Shared>,
}

impl SessionTimer {
    pub fn new(
        store: SessionStore,
        clock: Arc<dyn Clock>,
        widget: WidgetStateBridge,
        voice: Arc<dyn VoicePrompt>,
        settings: Arc<SettingsStore>,
        config: TimerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: TimerState::new(),
                    title: None,
                    ticks: 0,
                    ticker: None,
                    day_end: None,
                }),
                store,
                clock,
                widget,
                voice,
                settings,
                events,
                config,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.shared.events.subscribe()
    }

    pub async fn get_snapshot(&self) -> TimerSnapshot {
        let inner = self.shared.inner.lock().await;
        let mut state = inner.state.clone();
        if state.status.is_running() {
            state.elapsed_secs = state.elapsed_secs_at(self.shared.clock.now());
        }
        TimerSnapshot::from(&state)
    }

    pub async fn current_task_id(&self) -> Option<String> {
        self.shared.inner.lock().await.state.task_id.clone()
    }

    pub async fn start(&self, task_id: &str, planned_minutes: u32) -> Result<TimerSnapshot> {
        if planned_minutes == 0 {
            bail!("planned_minutes must be greater than zero");
        }

        let mut inner = self.shared.inner.lock().await;
        if inner.state.status != TimerStatus::Idle {
            bail!("timer already active");
        }

        let task = self
            .shared
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("task {task_id} not found"))?;

        let now = self.shared.clock.now();
        let store = &self.shared.store;
        store.mark_task_started(task_id, now).await;
        let session = store
            .open_or_create_session(task_id, planned_minutes, now)
            .await;

        let policy = self.shared.settings.pause_policy();
        inner.state.begin(
            task_id.to_string(),
            session.map(|session| session.id),
            planned_minutes,
            policy,
            now,
        );
        inner.ticks = 0;
        self.arm_timers(&mut inner, now);

        self.shared
            .widget
            .publish_running(&task.title, now, planned_minutes);
        inner.title = Some(task.title);

        info!("Started '{task_id}' for {planned_minutes} min ({policy:?})");
        Ok(self.emit_state_changed(&inner.state))
    }

    pub async fn pause(&self) -> Result<TimerSnapshot> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.status.is_running() {
            bail!("timer is not running");
        }
        let now = self.shared.clock.now();
        Ok(self.pause_locked(&mut inner, now).await)
    }

    /// Records why the user stepped away, then pauses.
    pub async fn interrupt(
        &self,
        reason: InterruptionReason,
        note: Option<String>,
    ) -> Result<TimerSnapshot> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.status.is_running() {
            bail!("timer is not running");
        }
        let session_id = inner
            .state
            .session_id
            .clone()
            .ok_or_else(|| anyhow!("no open session to record an interruption on"))?;

        let now = self.shared.clock.now();
        if let Some(interruption) = self
            .shared
            .store
            .record_interruption(&session_id, reason, note, now)
            .await
        {
            info!("Interruption '{}' started", interruption.reason.label());
        }
        Ok(self.pause_locked(&mut inner, now).await)
    }

    /// Continues a paused run from its accumulated elapsed time. A run paused
    /// on an earlier local day is abandoned instead.
    pub async fn resume(&self) -> Result<TimerSnapshot> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.status != TimerStatus::Paused {
            bail!("timer is not paused");
        }
        let now = self.shared.clock.now();

        if let Some(started_at) = inner.state.started_at {
            if rollover::local_date(started_at) != rollover::local_date(now) {
                let task_id = inner.state.task_id.clone().unwrap_or_default();
                warn!("Run of '{task_id}' started on an earlier day; abandoning instead of resuming");
                let snapshot = self
                    .finish_locked(&mut inner, Some(TaskStatus::Interrupted), now)
                    .await;
                self.emit(TimerEvent::DayEnded { task_id });
                return Ok(snapshot);
            }
        }

        if let Some(session_id) = inner.state.session_id.clone() {
            if let Some(closed) = self
                .shared
                .store
                .close_open_interruption(&session_id, now)
                .await
            {
                info!("Interruption closed after {}s", closed.duration_secs);
            }
        }

        inner.state.resume(now);
        self.arm_timers(&mut inner, now);

        if let Some(title) = inner.title.as_deref() {
            let started_at = inner.state.effective_start(now).unwrap_or(now);
            self.shared
                .widget
                .publish_running(title, started_at, inner.state.planned_minutes);
        }

        Ok(self.emit_state_changed(&inner.state))
    }

    /// Ends the run without deciding its outcome; the task keeps its status.
    pub async fn stop(&self) -> Result<TimerSnapshot> {
        self.finish(None).await
    }

    pub async fn complete(&self) -> Result<TimerSnapshot> {
        self.finish(Some(TaskStatus::Completed)).await
    }

    pub async fn abandon(&self) -> Result<TimerSnapshot> {
        self.finish(Some(TaskStatus::Interrupted)).await
    }

    /// One recompute step. Normally driven by the ticker; a no-op unless running.
    pub async fn tick(&self) {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.status.is_running() {
            return;
        }

        let now = self.shared.clock.now();
        let crossed = inner.state.advance(now);
        let task_id = inner.state.task_id.clone().unwrap_or_default();

        for threshold in crossed {
            match threshold {
                Threshold::Halfway => {
                    self.prompt(&voice::halfway_message());
                    self.emit(TimerEvent::Halfway {
                        task_id: task_id.clone(),
                        elapsed_secs: inner.state.elapsed_secs,
                    });
                }
                Threshold::NearEnd { remaining_secs } => {
                    self.prompt(&voice::near_end_message(remaining_secs));
                    self.emit(TimerEvent::NearEnd {
                        task_id: task_id.clone(),
                        remaining_secs,
                    });
                }
                Threshold::Overtime => {
                    info!("'{task_id}' is now overtime");
                    self.emit(TimerEvent::OvertimeStarted {
                        task_id: task_id.clone(),
                    });
                    self.emit_state_changed(&inner.state);
                }
            }
        }

        self.emit(TimerEvent::Tick {
            snapshot: TimerSnapshot::from(&inner.state),
        });

        inner.ticks = inner.ticks.wrapping_add(1);
        if inner.ticks % self.shared.config.heartbeat_every_ticks.max(1) == 0 {
            self.shared
                .store
                .checkpoint_actual_time(&task_id, inner.state.actual_minutes(), now)
                .await;
        }
    }

    /// Cancels the ticker and deadline without touching the run. A run left
    /// behind is repaired by launch recovery.
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.ticker = None;
        inner.day_end = None;
    }

    async fn finish(&self, status: Option<TaskStatus>) -> Result<TimerSnapshot> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.status == TimerStatus::Idle {
            bail!("no active session to stop");
        }
        let now = self.shared.clock.now();
        Ok(self.finish_locked(&mut inner, status, now).await)
    }

    async fn handle_day_end(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.status == TimerStatus::Idle {
            return;
        }
        let task_id = inner.state.task_id.clone().unwrap_or_default();
        warn!("Day ended with '{task_id}' still active; completing it");

        let now = self.shared.clock.now();
        self.finish_locked(&mut inner, Some(TaskStatus::Completed), now)
            .await;
        self.emit(TimerEvent::DayEnded { task_id });
    }

    async fn pause_locked(&self, inner: &mut Inner, now: DateTime<Utc>) -> TimerSnapshot {
        inner.ticker = None;
        inner.day_end = None;
        inner.state.pause(now);

        if let Some(task_id) = inner.state.task_id.as_deref() {
            self.shared
                .store
                .checkpoint_actual_time(task_id, inner.state.actual_minutes(), now)
                .await;
        }
        self.shared.widget.publish_idle();

        self.emit_state_changed(&inner.state)
    }

    /// Closes the run's records and returns the final snapshot, taken before
    /// the state is cleared.
    async fn finish_locked(
        &self,
        inner: &mut Inner,
        status: Option<TaskStatus>,
        now: DateTime<Utc>,
    ) -> TimerSnapshot {
        inner.ticker = None;
        inner.day_end = None;

        let elapsed_secs = inner.state.stop(now);
        let actual_minutes = inner.state.actual_minutes();
        let store = &self.shared.store;

        if let Some(session_id) = inner.state.session_id.as_deref() {
            store.close_open_interruption(session_id, now).await;
            store
                .close_session(
                    session_id,
                    now,
                    elapsed_secs,
                    status == Some(TaskStatus::Completed),
                )
                .await;
        }
        if let Some(task_id) = inner.state.task_id.as_deref() {
            store
                .finish_task(task_id, actual_minutes, now, status)
                .await;
            info!("Finished '{task_id}' after {actual_minutes} min ({status:?})");
        }
        self.shared.widget.publish_idle();

        let snapshot = self.emit_state_changed(&inner.state);
        inner.state.reset();
        inner.title = None;
        inner.ticks = 0;
        snapshot
    }

    fn arm_timers(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let weak = Arc::downgrade(&self.shared);
        inner.ticker = Some(TimerHandle::repeating(
            self.shared.config.tick_interval,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(timer) = upgrade(&weak) {
                        timer.tick().await;
                    }
                }
            },
        ));

        // Inside the final second the midnight sweep interrupts the run.
        let Some(deadline) = rollover::day_end_deadline(now) else {
            inner.day_end = None;
            return;
        };
        let weak = Arc::downgrade(&self.shared);
        inner.day_end = Some(TimerHandle::once(
            rollover::until(now, deadline),
            move || async move {
                if let Some(timer) = upgrade(&weak) {
                    timer.handle_day_end().await;
                }
            },
        ));
    }

    fn prompt(&self, text: &str) {
        if self.shared.settings.voice_prompt_enabled() {
            self.shared.voice.announce(text);
        }
    }

    fn emit_state_changed(&self, state: &TimerState) -> TimerSnapshot {
        let snapshot = TimerSnapshot::from(state);
        self.emit(TimerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<SessionTimer> {
    weak.upgrade().map(|shared| SessionTimer { shared })
}
