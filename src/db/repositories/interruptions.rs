use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime,
        seconds_between, to_i64, to_u64,
    },
    models::{Interruption, InterruptionReason},
};

fn row_to_interruption(row: &Row) -> Result<Interruption> {
    let reason: String = row.get("reason")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let duration_secs: i64 = row.get("duration_secs")?;

    Ok(Interruption {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        reason: InterruptionReason::from(reason),
        note: row.get("note")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_secs: to_u64(duration_secs, "duration_secs")?,
    })
}

fn find_open_interruption(conn: &Connection, session_id: &str) -> Result<Option<Interruption>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, reason, note, start_time, end_time, duration_secs
         FROM interruptions
         WHERE session_id = ?1 AND end_time IS NULL
         ORDER BY start_time DESC, rowid DESC
         LIMIT 1",
    )?;
    let mut rows = stmt.query(params![session_id])?;
    let interruption = match rows.next()? {
        Some(row) => Some(row_to_interruption(row)?),
        None => None,
    };
    Ok(interruption)
}

/// Closes the newest open interruption using the start time as stored, not
/// as the caller remembers it.
fn close_open(
    conn: &Connection,
    session_id: &str,
    ended_at: DateTime<Utc>,
) -> Result<Option<Interruption>> {
    let Some(mut open) = find_open_interruption(conn, session_id)? else {
        return Ok(None);
    };

    let duration_secs = seconds_between(open.start_time, ended_at);
    conn.execute(
        "UPDATE interruptions SET end_time = ?1, duration_secs = ?2 WHERE id = ?3",
        params![format_datetime(&ended_at), to_i64(duration_secs)?, open.id],
    )?;

    open.end_time = Some(ended_at);
    open.duration_secs = duration_secs;
    Ok(Some(open))
}

/// Result of recording an interruption: any interruption that had been left
/// open is closed first and returned alongside the new one.
#[derive(Debug, Clone)]
pub struct RecordedInterruption {
    pub closed: Option<Interruption>,
    pub created: Interruption,
}

impl Database {
    pub async fn record_interruption(
        &self,
        session_id: &str,
        reason: InterruptionReason,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RecordedInterruption> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let closed = close_open(&tx, &session_id, now)?;

            let created = Interruption {
                id: Uuid::new_v4().to_string(),
                session_id,
                reason,
                note,
                start_time: now,
                end_time: None,
                duration_secs: 0,
            };
            tx.execute(
                "INSERT INTO interruptions (id, session_id, reason, note, start_time, end_time, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    created.id,
                    created.session_id,
                    created.reason.label(),
                    created.note,
                    format_datetime(&created.start_time),
                    format_optional_datetime(created.end_time.as_ref()),
                ],
            )?;
            tx.commit()?;

            Ok(RecordedInterruption { closed, created })
        })
        .await
    }

    /// Closes the session's open interruption, if any. Returns the closed record.
    pub async fn close_open_interruption(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Interruption>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| close_open(conn, &session_id, ended_at))
            .await
    }

    pub async fn list_interruptions_for_session(&self, session_id: &str) -> Result<Vec<Interruption>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, reason, note, start_time, end_time, duration_secs
                 FROM interruptions
                 WHERE session_id = ?1
                 ORDER BY start_time ASC, rowid ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut interruptions = Vec::new();
            while let Some(row) = rows.next()? {
                interruptions.push(row_to_interruption(row)?);
            }

            Ok(interruptions)
        })
        .await
    }
}
