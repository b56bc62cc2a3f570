use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, to_i64, to_u32, to_u64},
    models::Session,
};

fn row_to_session(row: &Row) -> Result<Session> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let planned_minutes: i64 = row.get("planned_minutes")?;
    let actual_duration_secs: i64 = row.get("actual_duration_secs")?;

    Ok(Session {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        planned_minutes: to_u32(planned_minutes, "planned_minutes")?,
        actual_duration_secs: to_u64(actual_duration_secs, "actual_duration_secs")?,
        is_completed: row.get("is_completed")?,
    })
}

pub(crate) fn find_open_session(conn: &Connection, task_id: &str) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, start_time, end_time, planned_minutes, actual_duration_secs, is_completed
         FROM sessions
         WHERE task_id = ?1 AND end_time IS NULL
         ORDER BY start_time DESC, rowid DESC
         LIMIT 1",
    )?;

    let mut rows = stmt.query(params![task_id])?;
    let session = match rows.next()? {
        Some(row) => Some(row_to_session(row)?),
        None => None,
    };
    Ok(session)
}

impl Database {
    /// Returns the task's newest open session, creating one started at `now`
    /// only when none exists. Runs as a single worker-thread task so two
    /// callers can never both insert.
    pub async fn open_or_create_session(
        &self,
        task_id: &str,
        planned_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = find_open_session(&tx, &task_id)? {
                return Ok(existing);
            }

            let session = Session {
                id: Uuid::new_v4().to_string(),
                task_id,
                start_time: now,
                end_time: None,
                planned_minutes,
                actual_duration_secs: 0,
                is_completed: false,
            };
            tx.execute(
                "INSERT INTO sessions (id, task_id, start_time, end_time, planned_minutes, actual_duration_secs, is_completed)
                 VALUES (?1, ?2, ?3, NULL, ?4, 0, 0)",
                params![
                    session.id,
                    session.task_id,
                    format_datetime(&session.start_time),
                    session.planned_minutes,
                ],
            )?;
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    pub async fn get_open_session(&self, task_id: &str) -> Result<Option<Session>> {
        let task_id = task_id.to_string();
        self.execute(move |conn| find_open_session(conn, &task_id))
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, start_time, end_time, planned_minutes, actual_duration_secs, is_completed
                 FROM sessions
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn list_sessions_for_task(&self, task_id: &str) -> Result<Vec<Session>> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, start_time, end_time, planned_minutes, actual_duration_secs, is_completed
                 FROM sessions
                 WHERE task_id = ?1
                 ORDER BY start_time DESC, rowid DESC",
            )?;

            let mut rows = stmt.query(params![task_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        actual_duration_secs: u64,
        is_completed: bool,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET end_time = ?1,
                     actual_duration_secs = ?2,
                     is_completed = ?3
                 WHERE id = ?4 AND end_time IS NULL",
                params![
                    format_datetime(&ended_at),
                    to_i64(actual_duration_secs)?,
                    is_completed,
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
