use anyhow::Result;

use crate::db::{
    connection::Database,
    helpers::{to_u32, to_u64},
    models::{FocusSummary, InterruptionSummary, ReasonCount, TaskStatus},
};

impl Database {
    pub async fn interruption_summary(&self) -> Result<InterruptionSummary> {
        self.execute(|conn| {
            let (total_count, total_secs): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(duration_secs), 0) FROM interruptions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stmt = conn.prepare(
                "SELECT reason, COUNT(*) AS count
                 FROM interruptions
                 GROUP BY reason
                 ORDER BY count DESC, reason ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut by_reason = Vec::new();
            while let Some(row) = rows.next()? {
                let count: i64 = row.get(1)?;
                by_reason.push(ReasonCount {
                    reason: row.get(0)?,
                    count: to_u32(count, "count")?,
                });
            }

            let total_count = to_u32(total_count, "total_count")?;
            let total_secs = to_u64(total_secs, "total_secs")?;
            let average_secs = if total_count == 0 {
                0
            } else {
                total_secs / u64::from(total_count)
            };

            Ok(InterruptionSummary {
                total_count,
                total_secs,
                average_secs,
                by_reason,
            })
        })
        .await
    }

    /// Totals over closed sessions plus the task completion count
    pub async fn focus_summary(&self) -> Result<FocusSummary> {
        self.execute(|conn| {
            let (session_count, total_focus_secs): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(actual_duration_secs), 0)
                 FROM sessions
                 WHERE end_time IS NOT NULL",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (completed_tasks, total_tasks): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0), COUNT(*)
                 FROM tasks",
                [TaskStatus::Completed.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(FocusSummary {
                session_count: to_u32(session_count, "session_count")?,
                total_focus_secs: to_u64(total_focus_secs, "total_focus_secs")?,
                completed_tasks: to_u32(completed_tasks, "completed_tasks")?,
                total_tasks: to_u32(total_tasks, "total_tasks")?,
            })
        })
        .await
    }
}
