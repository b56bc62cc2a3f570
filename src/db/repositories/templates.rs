use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, to_u32},
    models::{Task, TaskInput, TaskTemplate, TemplateInput},
};

fn row_to_template(row: &Row) -> Result<TaskTemplate> {
    let estimated_minutes: i64 = row.get("estimated_minutes")?;
    let created_at: String = row.get("created_at")?;

    Ok(TaskTemplate {
        id: row.get("id")?,
        title: row.get("title")?,
        estimated_minutes: to_u32(estimated_minutes, "estimated_minutes")?,
        display_order: row.get("display_order")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn create_template(
        &self,
        input: TemplateInput,
        now: DateTime<Utc>,
    ) -> Result<TaskTemplate> {
        let template = TaskTemplate {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            estimated_minutes: input.estimated_minutes,
            display_order: input.display_order,
            created_at: now,
        };
        let record = template.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO task_templates (id, title, estimated_minutes, display_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.title,
                    record.estimated_minutes,
                    record.display_order,
                    format_datetime(&record.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(template)
    }

    pub async fn get_template(&self, template_id: &str) -> Result<Option<TaskTemplate>> {
        let template_id = template_id.to_string();
        self.execute(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, title, estimated_minutes, display_order, created_at
                     FROM task_templates WHERE id = ?1",
                    params![template_id],
                    |row| Ok(row_to_template(row)),
                )
                .optional()?;
            row.transpose()
        })
        .await
    }

    pub async fn list_templates(&self) -> Result<Vec<TaskTemplate>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, estimated_minutes, display_order, created_at
                 FROM task_templates
                 ORDER BY display_order ASC, created_at ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut templates = Vec::new();
            while let Some(row) = rows.next()? {
                templates.push(row_to_template(row)?);
            }
            Ok(templates)
        })
        .await
    }

    /// Removing a template never touches tasks already created from it.
    pub async fn delete_template(&self, template_id: &str) -> Result<()> {
        let template_id = template_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM task_templates WHERE id = ?1",
                params![template_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Plans a fresh `NotStarted` task on `planned_date` with the template's
    /// title and estimate.
    pub async fn create_task_from_template(
        &self,
        template_id: &str,
        planned_date: NaiveDate,
        display_order: i64,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let template = self
            .get_template(template_id)
            .await?
            .ok_or_else(|| anyhow!("Template not found"))?;

        self.create_task(
            TaskInput {
                title: template.title,
                estimated_minutes: template.estimated_minutes,
                planned_date: Some(planned_date),
                display_order,
            },
            now,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TaskStatus;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn template(title: &str, minutes: u32, display_order: i64) -> TemplateInput {
        TemplateInput {
            title: title.to_string(),
            estimated_minutes: minutes,
            display_order,
        }
    }

    #[tokio::test]
    async fn templates_list_in_display_order_and_can_be_removed() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("templates.sqlite3")).unwrap();

        let reading = db.create_template(template("Reading", 20, 2), t(0)).await.unwrap();
        db.create_template(template("Inbox zero", 15, 1), t(1)).await.unwrap();

        let titles: Vec<_> = db
            .list_templates()
            .await
            .unwrap()
            .into_iter()
            .map(|template| template.title)
            .collect();
        assert_eq!(titles, vec!["Inbox zero", "Reading"]);

        db.delete_template(&reading.id).await.unwrap();
        assert!(db.get_template(&reading.id).await.unwrap().is_none());
        assert_eq!(db.list_templates().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tasks_created_from_a_template_copy_title_and_estimate() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("templates.sqlite3")).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let essay = db.create_template(template("Essay", 45, 0), t(0)).await.unwrap();
        let task = db
            .create_task_from_template(&essay.id, monday, 3, t(60))
            .await
            .unwrap();

        assert_eq!(task.title, "Essay");
        assert_eq!(task.estimated_minutes, 45);
        assert_eq!(task.planned_date, Some(monday));
        assert_eq!(task.display_order, 3);
        assert_eq!(task.status, TaskStatus::NotStarted);

        db.delete_template(&essay.id).await.unwrap();
        assert!(db.get_task(&task.id).await.unwrap().is_some());
        assert!(db
            .create_task_from_template(&essay.id, monday, 0, t(120))
            .await
            .is_err());
    }
}
