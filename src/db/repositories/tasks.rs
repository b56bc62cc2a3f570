use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, format_optional_datetime, parse_datetime, parse_optional_date,
        parse_optional_datetime, parse_status, seconds_between, to_i64, to_u32,
    },
    models::{Task, TaskInput, TaskStatus},
};

const TASK_COLUMNS: &str = "id, title, estimated_minutes, planned_date, status, actual_minutes, \
     start_time, end_time, display_order, created_at, updated_at";

fn row_to_task(row: &Row) -> Result<Task> {
    let planned_date: Option<String> = row.get("planned_date")?;
    let status: String = row.get("status")?;
    let start_time: Option<String> = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let estimated_minutes: i64 = row.get("estimated_minutes")?;
    let actual_minutes: i64 = row.get("actual_minutes")?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        estimated_minutes: to_u32(estimated_minutes, "estimated_minutes")?,
        planned_date: parse_optional_date(planned_date, "planned_date")?,
        status: parse_status(&status)?,
        actual_minutes: to_u32(actual_minutes, "actual_minutes")?,
        start_time: parse_optional_datetime(start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        display_order: row.get("display_order")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn query_tasks(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(row_to_task(row)?);
    }
    Ok(tasks)
}

fn update_one(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<()> {
    let rows_affected = conn.execute(sql, args)?;
    if rows_affected == 0 {
        return Err(anyhow!("Task not found"));
    }
    Ok(())
}

impl Database {
    pub async fn create_task(&self, input: TaskInput, now: DateTime<Utc>) -> Result<Task> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            estimated_minutes: input.estimated_minutes,
            planned_date: input.planned_date,
            status: TaskStatus::NotStarted,
            actual_minutes: 0,
            start_time: None,
            end_time: None,
            display_order: input.display_order,
            created_at: now,
            updated_at: now,
        };
        let record = task.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, estimated_minutes, planned_date, status, actual_minutes, start_time, end_time, display_order, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.title,
                    record.estimated_minutes,
                    record.planned_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    record.status.as_str(),
                    record.actual_minutes,
                    record.display_order,
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
            Ok(query_tasks(conn, &sql, &[&task_id])?.into_iter().next())
        })
        .await
    }

    /// Tasks planned for `date`, in display order
    pub async fn list_tasks_for_date(&self, date: NaiveDate) -> Result<Vec<Task>> {
        let date = date.format("%Y-%m-%d").to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE planned_date = ?1
                 ORDER BY display_order ASC, created_at ASC"
            );
            query_tasks(conn, &sql, &[&date])
        })
        .await
    }

    pub async fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE status = ?1
                 ORDER BY start_time DESC"
            );
            query_tasks(conn, &sql, &[&status.as_str()])
        })
        .await
    }

    pub async fn mark_task_started(&self, task_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            update_one(
                conn,
                "UPDATE tasks
                 SET status = ?1,
                     start_time = ?2,
                     end_time = NULL,
                     updated_at = ?2
                 WHERE id = ?3",
                &[
                    &TaskStatus::InProgress.as_str(),
                    &format_datetime(&started_at),
                    &task_id,
                ],
            )
        })
        .await
    }

    pub async fn update_task_actual_time(
        &self,
        task_id: &str,
        actual_minutes: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            update_one(
                conn,
                "UPDATE tasks
                 SET actual_minutes = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                &[&actual_minutes, &format_datetime(&updated_at), &task_id],
            )
        })
        .await
    }

    /// Writes the final actual time and end timestamp; `status` is left alone when `None`.
    pub async fn finish_task(
        &self,
        task_id: &str,
        actual_minutes: u32,
        ended_at: DateTime<Utc>,
        status: Option<TaskStatus>,
    ) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let ended_at = format_datetime(&ended_at);
            match status {
                Some(status) => update_one(
                    conn,
                    "UPDATE tasks
                     SET actual_minutes = ?1,
                         end_time = ?2,
                         status = ?3,
                         updated_at = ?2
                     WHERE id = ?4",
                    &[&actual_minutes, &ended_at, &status.as_str(), &task_id],
                ),
                None => update_one(
                    conn,
                    "UPDATE tasks
                     SET actual_minutes = ?1,
                         end_time = ?2,
                         updated_at = ?2
                     WHERE id = ?3",
                    &[&actual_minutes, &ended_at, &task_id],
                ),
            }
        })
        .await
    }

    pub async fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            update_one(
                conn,
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                &[&status.as_str(), &format_datetime(&updated_at), &task_id],
            )
        })
        .await
    }

    /// Forces every `InProgress` task whose run began before `cutoff` (all of
    /// them when `cutoff` is `None`) into `Interrupted`, stamped at `now`, and
    /// closes the open sessions and interruptions it left behind. Returns the
    /// ids of the repaired tasks.
    pub async fn interrupt_stale_tasks(
        &self,
        cutoff: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let cutoff = format_optional_datetime(cutoff.as_ref());
            let now_text = format_datetime(&now);

            let stale: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM tasks
                     WHERE status = ?1
                       AND (?2 IS NULL OR start_time IS NULL OR start_time < ?2)",
                )?;
                let ids = stmt
                    .query_map(params![TaskStatus::InProgress.as_str(), cutoff], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            for task_id in &stale {
                let open_interruptions: Vec<(String, String)> = {
                    let mut stmt = tx.prepare(
                        "SELECT i.id, i.start_time FROM interruptions i
                         JOIN sessions s ON s.id = i.session_id
                         WHERE s.task_id = ?1 AND i.end_time IS NULL",
                    )?;
                    let rows = stmt
                        .query_map(params![task_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                };
                for (interruption_id, started_at) in open_interruptions {
                    let started_at = parse_datetime(&started_at, "start_time")?;
                    tx.execute(
                        "UPDATE interruptions SET end_time = ?1, duration_secs = ?2 WHERE id = ?3",
                        params![
                            now_text,
                            to_i64(seconds_between(started_at, now))?,
                            interruption_id
                        ],
                    )?;
                }

                let open_sessions: Vec<(String, String)> = {
                    let mut stmt = tx.prepare(
                        "SELECT id, start_time FROM sessions
                         WHERE task_id = ?1 AND end_time IS NULL",
                    )?;
                    let rows = stmt
                        .query_map(params![task_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                };
                for (session_id, started_at) in open_sessions {
                    let started_at = parse_datetime(&started_at, "start_time")?;
                    tx.execute(
                        "UPDATE sessions SET end_time = ?1, actual_duration_secs = ?2 WHERE id = ?3",
                        params![
                            now_text,
                            to_i64(seconds_between(started_at, now))?,
                            session_id
                        ],
                    )?;
                }
                tx.execute(
                    "UPDATE tasks
                     SET status = ?1,
                         end_time = ?2,
                         updated_at = ?2
                     WHERE id = ?3",
                    params![TaskStatus::Interrupted.as_str(), now_text, task_id],
                )?;
            }

            tx.commit()?;
            Ok(stale)
        })
        .await
    }

    /// Delete a task; its sessions and their interruptions go with it
    /// through ON DELETE CASCADE.
    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn input(title: &str, date: NaiveDate, display_order: i64) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            estimated_minutes: 25,
            planned_date: Some(date),
            display_order,
        }
    }

    fn open_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("tasks.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn lists_a_day_in_display_order() {
        let (_dir, db) = open_db();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();

        db.create_task(input("Second", monday, 2), t(0)).await.unwrap();
        db.create_task(input("First", monday, 1), t(1)).await.unwrap();
        db.create_task(input("Tomorrow", tuesday, 0), t(2)).await.unwrap();

        let titles: Vec<_> = db
            .list_tasks_for_date(monday)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn status_changes_round_trip() {
        let (_dir, db) = open_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let task = db.create_task(input("Essay", date, 0), t(0)).await.unwrap();
        assert_eq!(task.status, TaskStatus::NotStarted);

        db.mark_task_started(&task.id, t(10)).await.unwrap();
        let running = db.list_tasks_with_status(TaskStatus::InProgress).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].start_time, Some(t(10)));

        db.finish_task(&task.id, 12, t(730), None).await.unwrap();
        let finished = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(finished.status, TaskStatus::InProgress);
        assert_eq!(finished.actual_minutes, 12);
        assert_eq!(finished.end_time, Some(t(730)));

        db.set_task_status(&task.id, TaskStatus::Completed, t(731))
            .await
            .unwrap();
        let done = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.updated_at, t(731));
    }

    #[tokio::test]
    async fn unknown_task_updates_fail() {
        let (_dir, db) = open_db();
        assert!(db.mark_task_started("missing", t(0)).await.is_err());
        assert!(db.update_task_actual_time("missing", 1, t(0)).await.is_err());
        assert!(db.get_task("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_task_removes_its_history() {
        let (_dir, db) = open_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let task = db.create_task(input("Essay", date, 0), t(0)).await.unwrap();
        let session = db.open_or_create_session(&task.id, 25, t(0)).await.unwrap();
        db.record_interruption(&session.id, "Water".into(), None, t(30))
            .await
            .unwrap();

        db.delete_task(&task.id).await.unwrap();

        assert!(db.get_session(&session.id).await.unwrap().is_none());
        assert!(db
            .list_interruptions_for_session(&session.id)
            .await
            .unwrap()
            .is_empty());
    }
}
