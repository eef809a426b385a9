use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};

use crate::agenda::clock::MinuteOfDay;
use crate::db::{
    helpers::{
        day_param, parse_day, parse_time, placeholders, time_param, to_i64, to_optional_usize,
        to_usize,
    },
    models::{ImprovementTaskUpsert, RequirementTaskUpsert, TaskPatch, TaskRecord},
    Database,
};
use crate::store::{Scope, TaskStore};

const TASK_COLUMNS: &str = "id, owner_id, group_id, description, due_date, start_time, end_time, \
     is_completed, priority, appointment_id, requirement_index, improvement_id, document_id";

fn row_to_task(row: &Row) -> Result<TaskRecord> {
    let due_date: String = row.get("due_date")?;
    let start_time: Option<String> = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let requirement_index: Option<i64> = row.get("requirement_index")?;

    Ok(TaskRecord {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        group_id: row.get("group_id")?,
        description: row.get("description")?,
        due_date: parse_day(&due_date, "due_date")?,
        start_time: parse_time(start_time, "start_time")?,
        end_time: parse_time(end_time, "end_time")?,
        is_completed: row.get("is_completed")?,
        priority: row.get("priority")?,
        appointment_id: row.get("appointment_id")?,
        requirement_index: to_optional_usize(requirement_index, "requirement_index")?,
        improvement_id: row.get("improvement_id")?,
        document_id: row.get("document_id")?,
    })
}

fn collect_tasks(conn: &rusqlite::Connection, sql: &str, values: &[String]) -> Result<Vec<TaskRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(row_to_task(row)?);
    }
    Ok(tasks)
}

/// Translates a provenance scope into a WHERE fragment plus its bind values.
/// `None` means the scope cannot match anything.
pub(super) fn scope_clause(scope: Scope<'_>) -> Option<(String, Vec<String>)> {
    match scope {
        Scope::Owner(owner) => Some(("owner_id = ?".to_string(), vec![owner.to_string()])),
        Scope::Groups(ids) if ids.is_empty() => None,
        Scope::Groups(ids) => Some((
            format!("group_id IN ({})", placeholders(ids.len())),
            ids.to_vec(),
        )),
        Scope::Ids(ids) if ids.is_empty() => None,
        Scope::Ids(ids) => Some((format!("id IN ({})", placeholders(ids.len())), ids.to_vec())),
    }
}

#[async_trait]
impl TaskStore for Database {
    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![id])?;
            let task = match rows.next()? {
                Some(row) => Some(row_to_task(row)?),
                None => None,
            };
            Ok(task)
        })
        .await
    }

    async fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        let record = task.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, owner_id, group_id, description, due_date, start_time, end_time,
                                    is_completed, priority, appointment_id, requirement_index,
                                    improvement_id, document_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    record.owner_id,
                    record.group_id,
                    record.description,
                    day_param(record.due_date),
                    time_param(record.start_time),
                    time_param(record.end_time),
                    record.is_completed,
                    record.priority,
                    record.appointment_id,
                    record.requirement_index.map(to_i64).transpose()?,
                    record.improvement_id,
                    record.document_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_task_times(
        &self,
        id: &str,
        start: MinuteOfDay,
        end: MinuteOfDay,
    ) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE tasks SET start_time = ?1, end_time = ?2 WHERE id = ?3",
                params![start.to_string(), end.to_string(), id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Task {id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn set_task_completed(&self, id: &str, completed: bool) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE tasks SET is_completed = ?1 WHERE id = ?2",
                params![completed, id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Task {id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<()> {
        let id = id.to_string();
        let patch = patch.clone();
        self.execute(move |conn| {
            let mut updates = Vec::new();
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(description) = patch.description {
                updates.push("description = ?");
                params_vec.push(Box::new(description));
            }
            if let Some(due_date) = patch.due_date {
                updates.push("due_date = ?");
                params_vec.push(Box::new(day_param(due_date)));
            }
            if let Some(start) = patch.start_time {
                updates.push("start_time = ?");
                params_vec.push(Box::new(time_param(start)));
            }
            if let Some(end) = patch.end_time {
                updates.push("end_time = ?");
                params_vec.push(Box::new(time_param(end)));
            }

            if updates.is_empty() {
                return Err(anyhow!("No fields to update"));
            }

            let query = format!("UPDATE tasks SET {} WHERE id = ?", updates.join(", "));
            params_vec.push(Box::new(id.clone()));

            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
            let rows_affected = conn.execute(&query, params_refs.as_slice())?;
            if rows_affected == 0 {
                return Err(anyhow!("Task {id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            if rows_affected == 0 {
                return Err(anyhow!("Task {id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn completed_tasks_before(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<TaskRecord>> {
        let values = vec![owner_id.to_string(), day_param(date)];
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE owner_id = ? AND due_date < ? AND is_completed = 1"
            );
            collect_tasks(conn, &sql, &values)
        })
        .await
    }

    async fn delete_tasks(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let sql = format!("DELETE FROM tasks WHERE id IN ({})", placeholders(ids.len()));
            Ok(conn.execute(&sql, params_from_iter(ids.iter()))?)
        })
        .await
    }

    async fn roll_forward_incomplete(&self, owner_id: &str, today: NaiveDate) -> Result<usize> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let moved = conn.execute(
                "UPDATE tasks
                 SET due_date = ?1
                 WHERE owner_id = ?2
                   AND due_date < ?1
                   AND is_completed = 0
                   AND improvement_id IS NULL",
                params![day_param(today), owner_id],
            )?;
            Ok(moved)
        })
        .await
    }

    async fn upsert_requirement_task(&self, row: &RequirementTaskUpsert) -> Result<()> {
        let row = row.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, owner_id, group_id, description, due_date, is_completed,
                                    appointment_id, requirement_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(appointment_id, requirement_index) DO UPDATE SET
                     owner_id = excluded.owner_id,
                     group_id = excluded.group_id,
                     description = excluded.description,
                     due_date = excluded.due_date,
                     is_completed = excluded.is_completed",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    row.owner_id,
                    row.group_id,
                    row.description,
                    day_param(row.due_date),
                    row.is_completed,
                    row.appointment_id,
                    to_i64(row.requirement_index)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn requirement_task_indices(&self, appointment_id: &str) -> Result<Vec<usize>> {
        let appointment_id = appointment_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT requirement_index FROM tasks
                 WHERE appointment_id = ?1 AND requirement_index IS NOT NULL
                 ORDER BY requirement_index ASC",
            )?;
            let mut rows = stmt.query(params![appointment_id])?;
            let mut indices = Vec::new();
            while let Some(row) = rows.next()? {
                indices.push(to_usize(row.get(0)?, "requirement_index")?);
            }
            Ok(indices)
        })
        .await
    }

    async fn delete_requirement_tasks(
        &self,
        appointment_id: &str,
        indices: &[usize],
    ) -> Result<usize> {
        if indices.is_empty() {
            return Ok(0);
        }
        let appointment_id = appointment_id.to_string();
        let indices = indices.to_vec();
        self.execute(move |conn| {
            let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(appointment_id)];
            for index in &indices {
                params_vec.push(Box::new(to_i64(*index)?));
            }
            let sql = format!(
                "DELETE FROM tasks WHERE appointment_id = ? AND requirement_index IN ({})",
                placeholders(indices.len())
            );
            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
            Ok(conn.execute(&sql, params_refs.as_slice())?)
        })
        .await
    }

    async fn has_improvement_tasks(&self, owner_id: &str, date: NaiveDate) -> Result<bool> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM tasks
                     WHERE owner_id = ?1 AND due_date = ?2 AND improvement_id IS NOT NULL
                     LIMIT 1",
                    params![owner_id, day_param(date)],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn upsert_improvement_tasks(&self, rows: &[ImprovementTaskUpsert]) -> Result<()> {
        let rows = rows.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for row in &rows {
                tx.execute(
                    "INSERT INTO tasks (id, owner_id, description, due_date, is_completed, priority,
                                        improvement_id)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
                     ON CONFLICT(improvement_id, due_date, owner_id) DO UPDATE SET
                         description = excluded.description,
                         priority = excluded.priority",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        row.owner_id,
                        row.description,
                        day_param(row.due_date),
                        row.priority,
                        row.improvement_id,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

impl Database {
    /// Tasks due on `date` inside one provenance scope.
    pub(crate) async fn query_tasks_due(
        &self,
        scope: Scope<'_>,
        date: NaiveDate,
    ) -> Result<Vec<TaskRecord>> {
        let Some((clause, mut values)) = scope_clause(scope) else {
            return Ok(Vec::new());
        };
        values.push(day_param(date));
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE {clause} AND due_date = ?
                 ORDER BY start_time ASC"
            );
            collect_tasks(conn, &sql, &values)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn at(value: &str) -> MinuteOfDay {
        MinuteOfDay::parse(value).unwrap()
    }

    #[tokio::test]
    async fn insert_and_reload_round_trips_links() {
        let db = Database::open_in_memory().unwrap();
        let mut task = TaskRecord::new("owner", "renew passport", day(19))
            .with_times(at("09:00"), at("09:30"));
        task.document_id = Some("doc-1".into());
        task.priority = Some(2);
        db.insert_task(&task).await.unwrap();

        let loaded = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(db.get_task("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requirement_upsert_keeps_one_row_per_index() {
        let db = Database::open_in_memory().unwrap();
        let mut row = RequirementTaskUpsert {
            owner_id: "owner".into(),
            group_id: None,
            appointment_id: "appt".into(),
            requirement_index: 1,
            description: "[Appointment] Dentist — bring ID".into(),
            due_date: day(19),
            is_completed: false,
        };
        db.upsert_requirement_task(&row).await.unwrap();
        row.is_completed = true;
        db.upsert_requirement_task(&row).await.unwrap();

        assert_eq!(db.requirement_task_indices("appt").await.unwrap(), vec![1]);
        let tasks = db.query_tasks_due(Scope::Owner("owner"), day(19)).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].is_completed);
        assert_eq!(tasks[0].requirement_link(), Some(("appt", 1)));

        assert_eq!(db.delete_requirement_tasks("appt", &[1, 7]).await.unwrap(), 1);
        assert!(db.requirement_task_indices("appt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roll_forward_skips_completed_and_improvement_tasks() {
        let db = Database::open_in_memory().unwrap();
        let overdue = TaskRecord::new("owner", "water plants", day(17));
        let mut done = TaskRecord::new("owner", "laundry", day(17));
        done.is_completed = true;
        let mut improvement = TaskRecord::new("owner", "[Improvement] tidy desk", day(17));
        improvement.improvement_id = Some("imp".into());
        for task in [&overdue, &done, &improvement] {
            db.insert_task(task).await.unwrap();
        }

        assert_eq!(db.roll_forward_incomplete("owner", day(19)).await.unwrap(), 1);
        assert_eq!(db.get_task(&overdue.id).await.unwrap().unwrap().due_date, day(19));
        assert_eq!(db.get_task(&improvement.id).await.unwrap().unwrap().due_date, day(17));

        let completed = db.completed_tasks_before("owner", day(19)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        let task = TaskRecord::new("owner", "call plumber", day(19))
            .with_times(at("10:00"), at("10:30"));
        db.insert_task(&task).await.unwrap();

        let patch = TaskPatch {
            end_time: Some(None),
            ..TaskPatch::default()
        };
        db.update_task(&task.id, &patch).await.unwrap();

        let loaded = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.start_time, Some(at("10:00")));
        assert_eq!(loaded.end_time, None);
        assert_eq!(loaded.description.as_deref(), Some("call plumber"));

        assert!(db.update_task(&task.id, &TaskPatch::default()).await.is_err());
        assert!(db.set_task_completed("missing", true).await.is_err());
    }
}
