use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp;

use crate::settings::PausePolicy;

/// Remaining time at which the near-end prompt fires, capped at a quarter of the plan.
const NEAR_END_CAP_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    /// Still running after the planned duration; the count keeps going up.
    RunningOvertime,
    Paused,
}

impl TimerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, TimerStatus::Running | TimerStatus::RunningOvertime)
    }
}

/// A one-shot milestone crossed during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Halfway,
    NearEnd { remaining_secs: u64 },
    Overtime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub task_id: Option<String>,
    pub session_id: Option<String>,
    pub planned_minutes: u32,
    /// Wall-clock start of the run; unchanged by pause and resume.
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: u64,
    pub is_overtime: bool,
    pub pause_policy: PausePolicy,
    /// Running time banked before the current segment (or frozen while paused).
    #[serde(skip)]
    accumulated_ms: u64,
    #[serde(skip)]
    segment_started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    halfway_fired: bool,
    #[serde(skip)]
    near_end_fired: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            status: TimerStatus::Idle,
            task_id: None,
            session_id: None,
            planned_minutes: 0,
            started_at: None,
            elapsed_secs: 0,
            is_overtime: false,
            pause_policy: PausePolicy::default(),
            accumulated_ms: 0,
            segment_started_at: None,
            halfway_fired: false,
            near_end_fired: false,
        }
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    cmp::max((end - start).num_milliseconds(), 0) as u64
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(
        &mut self,
        task_id: String,
        session_id: Option<String>,
        planned_minutes: u32,
        pause_policy: PausePolicy,
        now: DateTime<Utc>,
    ) {
        *self = Self {
            status: TimerStatus::Running,
            task_id: Some(task_id),
            session_id,
            planned_minutes,
            started_at: Some(now),
            pause_policy,
            segment_started_at: Some(now),
            ..Self::default()
        };
    }

    pub fn planned_secs(&self) -> u64 {
        u64::from(self.planned_minutes) * 60
    }

    pub fn elapsed_ms_at(&self, now: DateTime<Utc>) -> u64 {
        if !self.status.is_running() {
            return self.accumulated_ms;
        }
        match self.pause_policy {
            PausePolicy::ExcludePaused => {
                let segment = self
                    .segment_started_at
                    .map(|start| millis_between(start, now))
                    .unwrap_or(0);
                self.accumulated_ms.saturating_add(segment)
            }
            PausePolicy::IncludePaused => self
                .started_at
                .map(|start| millis_between(start, now))
                .unwrap_or(self.accumulated_ms),
        }
    }

    pub fn elapsed_secs_at(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed_ms_at(now) / 1000
    }

    /// Recomputes elapsed time and reports the milestones crossed since the
    /// previous tick. Each milestone is reported at most once per run; a
    /// prompt whose first qualifying tick already lies past the planned end
    /// is consumed without being reported.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Vec<Threshold> {
        let mut crossed = Vec::new();
        if !self.status.is_running() {
            return crossed;
        }

        self.elapsed_secs = self.elapsed_secs_at(now);
        let planned = self.planned_secs();
        let elapsed = self.elapsed_secs;

        if !self.halfway_fired && elapsed >= planned / 2 {
            self.halfway_fired = true;
            if elapsed < planned {
                crossed.push(Threshold::Halfway);
            }
        }

        if self.planned_minutes > 1 && !self.near_end_fired {
            let trigger = cmp::min(NEAR_END_CAP_SECS, planned / 4);
            let remaining = planned.saturating_sub(elapsed);
            if remaining <= trigger {
                self.near_end_fired = true;
                if elapsed < planned {
                    crossed.push(Threshold::NearEnd {
                        remaining_secs: remaining,
                    });
                }
            }
        }

        if !self.is_overtime && elapsed >= planned {
            self.is_overtime = true;
            self.status = TimerStatus::RunningOvertime;
            crossed.push(Threshold::Overtime);
        }

        crossed
    }

    /// Freezes elapsed time; returns it in seconds.
    pub fn pause(&mut self, now: DateTime<Utc>) -> u64 {
        self.accumulated_ms = self.elapsed_ms_at(now);
        self.segment_started_at = None;
        self.status = TimerStatus::Paused;
        self.elapsed_secs = self.accumulated_ms / 1000;
        self.elapsed_secs
    }

    /// Starts a new running segment; the run's start instant is untouched.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.segment_started_at = Some(now);
        self.status = if self.is_overtime {
            TimerStatus::RunningOvertime
        } else {
            TimerStatus::Running
        };
    }

    /// Ends the run; returns the final elapsed time in seconds. Under
    /// `IncludePaused` a run stopped while paused still counts up to `now`.
    pub fn stop(&mut self, now: DateTime<Utc>) -> u64 {
        self.accumulated_ms = match (self.pause_policy, self.started_at) {
            (PausePolicy::IncludePaused, Some(start)) => millis_between(start, now),
            _ => self.elapsed_ms_at(now),
        };
        self.segment_started_at = None;
        self.status = TimerStatus::Idle;
        self.elapsed_secs = self.accumulated_ms / 1000;
        self.elapsed_secs
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn actual_minutes(&self) -> u32 {
        u32::try_from(self.elapsed_secs / 60).unwrap_or(u32::MAX)
    }

    /// Negative once overtime.
    pub fn remaining_secs(&self) -> i64 {
        self.planned_secs() as i64 - self.elapsed_secs as i64
    }

    /// The start instant a reader doing `now - start` would need to see the
    /// same elapsed time as this state.
    pub fn effective_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.started_at?;
        let elapsed = i64::try_from(self.elapsed_ms_at(now)).ok()?;
        Some(now - Duration::milliseconds(elapsed))
    }

    pub fn format_elapsed(&self) -> String {
        format_elapsed(self.elapsed_secs, self.is_overtime)
    }
}

/// `MM:SS`, prefixed with `+` when the run has overrun its plan.
pub fn format_elapsed(elapsed_secs: u64, is_overtime: bool) -> String {
    let prefix = if is_overtime { "+" } else { "" };
    format!("{prefix}{:02}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn running(planned_minutes: u32, policy: PausePolicy) -> TimerState {
        let mut state = TimerState::new();
        state.begin("task".into(), Some("session".into()), planned_minutes, policy, t0());
        state
    }

    fn tick_through(state: &mut TimerState, from: i64, to: i64) -> Vec<(i64, Threshold)> {
        let mut fired = Vec::new();
        for secs in from..=to {
            for threshold in state.advance(at(secs)) {
                fired.push((secs, threshold));
            }
        }
        fired
    }

    #[test]
    fn twenty_five_minute_run_crosses_each_milestone_once() {
        let mut state = running(25, PausePolicy::ExcludePaused);
        let fired = tick_through(&mut state, 1, 1620);

        assert_eq!(
            fired,
            vec![
                (750, Threshold::Halfway),
                (1380, Threshold::NearEnd { remaining_secs: 120 }),
                (1500, Threshold::Overtime),
            ]
        );
        assert!(state.is_overtime);
        assert_eq!(state.status, TimerStatus::RunningOvertime);
        assert_eq!(state.stop(at(1620)), 1620);
        assert_eq!(state.actual_minutes(), 27);
    }

    #[test]
    fn overtime_is_sticky() {
        let mut state = running(1, PausePolicy::ExcludePaused);
        tick_through(&mut state, 1, 60);
        assert!(state.is_overtime);

        state.pause(at(70));
        assert!(state.is_overtime);
        state.resume(at(80));
        assert_eq!(state.status, TimerStatus::RunningOvertime);
        assert!(state.advance(at(200)).is_empty());
        assert!(state.is_overtime);
        assert_eq!(state.format_elapsed(), "+03:10");
    }

    #[test]
    fn one_minute_plan_has_no_near_end_prompt() {
        let mut state = running(1, PausePolicy::ExcludePaused);
        let fired = tick_through(&mut state, 1, 90);
        assert_eq!(
            fired,
            vec![(30, Threshold::Halfway), (60, Threshold::Overtime)]
        );
    }

    #[test]
    fn short_plans_use_a_quarter_for_near_end() {
        // 4 minutes: min(120, 240 / 4) = 60 seconds before the end
        let mut state = running(4, PausePolicy::ExcludePaused);
        let fired = tick_through(&mut state, 1, 240);
        assert!(fired.contains(&(180, Threshold::NearEnd { remaining_secs: 60 })));
    }

    #[test]
    fn missed_ticks_past_the_end_skip_prompts() {
        let mut state = running(10, PausePolicy::ExcludePaused);
        assert_eq!(state.advance(at(5)), vec![]);
        assert_eq!(state.advance(at(900)), vec![Threshold::Overtime]);
        assert!(state.advance(at(901)).is_empty());
    }

    #[test]
    fn excluding_pauses_continues_from_the_paused_value() {
        let mut state = running(25, PausePolicy::ExcludePaused);
        assert_eq!(state.pause(at(300)), 300);
        assert_eq!(state.elapsed_secs_at(at(500)), 300);

        state.resume(at(600));
        assert_eq!(state.elapsed_secs_at(at(700)), 400);
        assert_eq!(state.stop(at(900)), 600);
        assert_eq!(state.actual_minutes(), 10);
        assert_eq!(state.started_at, Some(t0()));
    }

    #[test]
    fn including_pauses_measures_from_the_original_start() {
        let mut state = running(25, PausePolicy::IncludePaused);
        assert_eq!(state.pause(at(300)), 300);
        assert_eq!(state.elapsed_secs_at(at(500)), 300);

        state.resume(at(600));
        assert_eq!(state.stop(at(900)), 900);
        assert_eq!(state.actual_minutes(), 15);
    }

    #[test]
    fn including_pauses_counts_a_stop_while_paused() {
        let mut state = running(25, PausePolicy::IncludePaused);
        state.pause(at(300));
        assert_eq!(state.stop(at(900)), 900);
        assert_eq!(state.actual_minutes(), 15);

        let mut excluded = running(25, PausePolicy::ExcludePaused);
        excluded.pause(at(300));
        assert_eq!(excluded.stop(at(900)), 300);
    }

    #[test]
    fn effective_start_hides_paused_time() {
        let mut state = running(25, PausePolicy::ExcludePaused);
        state.pause(at(300));
        state.resume(at(600));
        assert_eq!(state.effective_start(at(600)), Some(at(300)));
    }

    #[test]
    fn idle_state_reports_nothing() {
        let mut state = TimerState::new();
        assert!(state.advance(at(10)).is_empty());
        assert_eq!(state.effective_start(at(10)), None);
        assert_eq!(state.format_elapsed(), "00:00");
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_elapsed(754, false), "12:34");
        assert_eq!(format_elapsed(61, true), "+01:01");
    }
}
