//! Keeps unfinished tasks from carrying over midnight or surviving a crash
//! in the `InProgress` state.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{clock::Clock, store::SessionStore, timer::TimerHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Converts a local wall-clock time on `date` back to an instant, taking the
/// earlier reading when a DST fold makes it ambiguous.
fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(time)).earliest()
}

/// 23:59:59 on the same local day as `now`.
pub fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    NaiveTime::from_hms_opt(23, 59, 59)
        .and_then(|time| local_instant(&tz, now.date_naive(), time))
        .unwrap_or_else(|| now.clone())
}

/// The first midnight strictly after `now`.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let tomorrow = now.date_naive() + Days::new(1);
    NaiveTime::from_hms_opt(0, 0, 0)
        .and_then(|time| local_instant(&tz, tomorrow, time))
        .or_else(|| {
            // Midnight skipped by a DST jump: take the first hour that exists.
            NaiveTime::from_hms_opt(1, 0, 0).and_then(|time| local_instant(&tz, tomorrow, time))
        })
        .unwrap_or_else(|| now.clone())
}

pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// When a run started at `now` must be closed out for the day, or `None`
/// once the last second has begun and the midnight sweep owns the run.
pub fn day_end_deadline(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let deadline = end_of_day(&now.with_timezone(&Local)).with_timezone(&Utc);
    (now < deadline).then_some(deadline)
}

pub fn until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Repairs tasks left `InProgress` by a run that no longer exists.
#[derive(Clone)]
pub struct DayRolloverGuard {
    store: SessionStore,
    clock: Arc<dyn Clock>,
}

impl DayRolloverGuard {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run once at process start, before any timer exists: every task still
    /// `InProgress` belongs to a run that died with the previous process.
    pub async fn recover_on_launch(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let repaired = self
            .store
            .database()
            .interrupt_stale_tasks(None, now)
            .await?;
        for task_id in &repaired {
            log_warn!("Recovered in-progress task {task_id}; marking as Interrupted");
        }
        Ok(repaired)
    }

    /// Interrupts `InProgress` tasks whose run began before `cutoff`.
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let now = self.clock.now();
        let repaired = self
            .store
            .database()
            .interrupt_stale_tasks(Some(cutoff), now)
            .await?;
        for task_id in &repaired {
            log_warn!("Task {task_id} carried over midnight; marking as Interrupted");
        }
        Ok(repaired)
    }

    /// Sweeps at every local midnight until the handle is cancelled.
    pub fn schedule_midnight_sweep(&self) -> TimerHandle {
        let guard = self.clone();
        TimerHandle::spawn(move |token| async move {
            let mut from = guard.clock.now();
            loop {
                let midnight = next_midnight(&from.with_timezone(&Local)).with_timezone(&Utc);
                let delay = until(guard.clock.now(), midnight);
                log_info!("Next midnight sweep in {}s", delay.as_secs());

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => break,
                }

                if let Err(err) = guard.sweep_before(midnight).await {
                    log_error!("Midnight sweep failed: {err:#}");
                }
                from = midnight;
            }
        })
    }
}
