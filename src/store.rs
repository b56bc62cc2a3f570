use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info};

use crate::db::{Database, Interruption, InterruptionReason, Session, Task, TaskStatus};

/// Timer-facing view of the task record store.
///
/// Write failures are logged and reported as "nothing changed" (`None` or
/// `false`) instead of being propagated: the timer keeps running on its
/// in-memory state and never blocks on a failed save.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn load_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.db.get_task(task_id).await
    }

    /// The task's open session, or a new one started at `now` if it has none.
    pub async fn open_or_create_session(
        &self,
        task_id: &str,
        planned_minutes: u32,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        match self
            .db
            .open_or_create_session(task_id, planned_minutes, now)
            .await
        {
            Ok(session) => Some(session),
            Err(err) => {
                error!("Failed to open session for task {task_id}: {err:#}");
                None
            }
        }
    }

    /// Starts a new interruption at `now`, closing any that was left open.
    pub async fn record_interruption(
        &self,
        session_id: &str,
        reason: InterruptionReason,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Interruption> {
        let note = note.filter(|text| !text.trim().is_empty());
        match self
            .db
            .record_interruption(session_id, reason, note, now)
            .await
        {
            Ok(recorded) => {
                if let Some(closed) = recorded.closed {
                    info!(
                        "Closed dangling interruption {} ({}s) before recording a new one",
                        closed.id, closed.duration_secs
                    );
                }
                Some(recorded.created)
            }
            Err(err) => {
                error!("Failed to record interruption for session {session_id}: {err:#}");
                None
            }
        }
    }

    /// Closes the session's open interruption. `None` when nothing was open
    /// or the write failed.
    pub async fn close_open_interruption(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Interruption> {
        match self.db.close_open_interruption(session_id, now).await {
            Ok(closed) => closed,
            Err(err) => {
                error!("Failed to close interruption for session {session_id}: {err:#}");
                None
            }
        }
    }

    pub async fn mark_task_started(&self, task_id: &str, now: DateTime<Utc>) -> bool {
        log_failure(
            self.db.mark_task_started(task_id, now).await,
            "mark task started",
            task_id,
        )
    }

    pub async fn checkpoint_actual_time(
        &self,
        task_id: &str,
        actual_minutes: u32,
        now: DateTime<Utc>,
    ) -> bool {
        log_failure(
            self.db
                .update_task_actual_time(task_id, actual_minutes, now)
                .await,
            "update actual time",
            task_id,
        )
    }

    pub async fn finish_task(
        &self,
        task_id: &str,
        actual_minutes: u32,
        now: DateTime<Utc>,
        status: Option<TaskStatus>,
    ) -> bool {
        log_failure(
            self.db
                .finish_task(task_id, actual_minutes, now, status)
                .await,
            "finish task",
            task_id,
        )
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        actual_duration_secs: u64,
        is_completed: bool,
    ) -> bool {
        log_failure(
            self.db
                .close_session(session_id, now, actual_duration_secs, is_completed)
                .await,
            "close session",
            session_id,
        )
    }
}

fn log_failure(result: Result<()>, operation: &str, id: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to {operation} for {id}: {err:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, new_task, temp_store};

    #[tokio::test]
    async fn reuses_the_open_session() {
        let (_dir, store) = temp_store();
        let task = new_task(&store, "Reading", 25).await;

        let first = store.open_or_create_session(&task.id, 25, at(0)).await.unwrap();
        let second = store.open_or_create_session(&task.id, 25, at(60)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.start_time, at(0));

        let sessions = store.database().list_sessions_for_task(&task.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn closed_session_is_not_reused() {
        let (_dir, store) = temp_store();
        let task = new_task(&store, "Reading", 25).await;

        let first = store.open_or_create_session(&task.id, 25, at(0)).await.unwrap();
        assert!(store.close_session(&first.id, at(100), 100, true).await);

        let second = store.open_or_create_session(&task.id, 25, at(200)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.start_time, at(200));
    }

    #[tokio::test]
    async fn recording_closes_the_previous_open_interruption() {
        let (_dir, store) = temp_store();
        let task = new_task(&store, "Reading", 25).await;
        let session = store.open_or_create_session(&task.id, 25, at(0)).await.unwrap();

        let first = store
            .record_interruption(&session.id, InterruptionReason::Phone, None, at(100))
            .await
            .unwrap();
        assert!(first.is_open());
        let second = store
            .record_interruption(
                &session.id,
                InterruptionReason::Custom("Doorbell".into()),
                Some("parcel".into()),
                at(160),
            )
            .await
            .unwrap();

        let all = store
            .database()
            .list_interruptions_for_session(&session.id)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].end_time, Some(at(160)));
        assert_eq!(all[0].duration_secs, 60);
        assert_eq!(all[1].id, second.id);
        assert_eq!(all[1].note.as_deref(), Some("parcel"));
        assert_eq!(all.iter().filter(|i| i.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn closing_without_an_open_interruption_is_a_no_op() {
        let (_dir, store) = temp_store();
        let task = new_task(&store, "Reading", 25).await;
        let session = store.open_or_create_session(&task.id, 25, at(0)).await.unwrap();

        assert!(store.close_open_interruption(&session.id, at(10)).await.is_none());

        store
            .record_interruption(&session.id, InterruptionReason::Water, None, at(20))
            .await
            .unwrap();
        let closed = store.close_open_interruption(&session.id, at(50)).await.unwrap();
        assert_eq!(closed.duration_secs, 30);
        assert!(store.close_open_interruption(&session.id, at(60)).await.is_none());
    }

    #[tokio::test]
    async fn blank_notes_are_dropped() {
        let (_dir, store) = temp_store();
        let task = new_task(&store, "Reading", 25).await;
        let session = store.open_or_create_session(&task.id, 25, at(0)).await.unwrap();

        let interruption = store
            .record_interruption(&session.id, InterruptionReason::Rest, Some("  ".into()), at(5))
            .await
            .unwrap();
        assert_eq!(interruption.note, None);
    }

    #[tokio::test]
    async fn write_failures_report_unchanged() {
        let (_dir, store) = temp_store();
        assert!(!store.mark_task_started("missing", at(0)).await);
        assert!(!store.finish_task("missing", 3, at(0), None).await);
        assert!(store.open_or_create_session("missing", 25, at(0)).await.is_none());
    }
}
