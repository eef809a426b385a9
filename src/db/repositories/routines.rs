use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Row, ToSql};

use crate::db::{
    helpers::{day_param, parse_day, parse_days_of_week, parse_optional_day, parse_time, time_param},
    models::{RoutinePatch, RoutineRecord},
    Database,
};
use crate::store::{RoutineStore, Scope};

use super::tasks::scope_clause;

const ROUTINE_COLUMNS: &str = "id, owner_id, group_id, description, start_date, end_date, \
     days_of_week, start_time, end_time, is_active";

fn row_to_routine(row: &Row) -> Result<RoutineRecord> {
    let start_date: String = row.get("start_date")?;
    let end_date: Option<String> = row.get("end_date")?;
    let days_of_week: String = row.get("days_of_week")?;
    let start_time: Option<String> = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(RoutineRecord {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        group_id: row.get("group_id")?,
        description: row.get("description")?,
        start_date: parse_day(&start_date, "start_date")?,
        end_date: parse_optional_day(end_date, "end_date")?,
        days_of_week: parse_days_of_week(&days_of_week)?,
        start_time: parse_time(start_time, "start_time")?,
        end_time: parse_time(end_time, "end_time")?,
        is_active: row.get("is_active")?,
    })
}

#[async_trait]
impl RoutineStore for Database {
    async fn get_routine(&self, id: &str) -> Result<Option<RoutineRecord>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {ROUTINE_COLUMNS} FROM routines WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![id])?;
            let routine = match rows.next()? {
                Some(row) => Some(row_to_routine(row)?),
                None => None,
            };
            Ok(routine)
        })
        .await
    }

    async fn insert_routine(&self, routine: &RoutineRecord) -> Result<()> {
        let record = routine.clone();
        self.execute(move |conn| {
            let days = serde_json::to_string(&record.days_of_week)?;
            conn.execute(
                "INSERT INTO routines (id, owner_id, group_id, description, start_date, end_date,
                                       days_of_week, start_time, end_time, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.owner_id,
                    record.group_id,
                    record.description,
                    day_param(record.start_date),
                    record.end_date.map(day_param),
                    days,
                    time_param(record.start_time),
                    time_param(record.end_time),
                    record.is_active,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_routine(&self, id: &str, patch: &RoutinePatch) -> Result<()> {
        let id = id.to_string();
        let patch = patch.clone();
        self.execute(move |conn| {
            let mut updates = Vec::new();
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(description) = patch.description {
                updates.push("description = ?");
                params_vec.push(Box::new(description));
            }
            if let Some(start_date) = patch.start_date {
                updates.push("start_date = ?");
                params_vec.push(Box::new(day_param(start_date)));
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

            let query = format!("UPDATE routines SET {} WHERE id = ?", updates.join(", "));
            params_vec.push(Box::new(id.clone()));

            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
            let rows_affected = conn.execute(&query, params_refs.as_slice())?;
            if rows_affected == 0 {
                return Err(anyhow!("Routine {id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn delete_routine(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute("DELETE FROM routines WHERE id = ?1", params![id])?;
            if rows_affected == 0 {
                return Err(anyhow!("Routine {id} not found"));
            }
            Ok(())
        })
        .await
    }
}

impl Database {
    /// Active routines inside one provenance scope, any day.
    pub(crate) async fn query_active_routines(
        &self,
        scope: Scope<'_>,
    ) -> Result<Vec<RoutineRecord>> {
        let Some((clause, values)) = scope_clause(scope) else {
            return Ok(Vec::new());
        };
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ROUTINE_COLUMNS} FROM routines
                 WHERE {clause} AND is_active = 1
                 ORDER BY start_time ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            let mut routines = Vec::new();
            while let Some(row) = rows.next()? {
                routines.push(row_to_routine(row)?);
            }
            Ok(routines)
        })
        .await
    }
}
