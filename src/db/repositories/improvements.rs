use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Row};

use crate::db::{
    helpers::{day_param, parse_optional_day, placeholders},
    models::Improvement,
    Database,
};
use crate::store::ImprovementStore;

fn row_to_improvement(row: &Row) -> Result<Improvement> {
    let effort_minutes: Option<i64> = row.get("effort_minutes")?;
    let last_done_at: Option<String> = row.get("last_done_at")?;
    let last_planned_at: Option<String> = row.get("last_planned_at")?;

    Ok(Improvement {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        title: row.get("title")?,
        priority: row.get("priority")?,
        // Negative or absurd efforts fall back to the planner default.
        effort_minutes: effort_minutes.and_then(|m| u32::try_from(m).ok()),
        category: row.get("category")?,
        cooldown_days: row.get("cooldown_days")?,
        last_done_at: parse_optional_day(last_done_at, "last_done_at")?,
        last_planned_at: parse_optional_day(last_planned_at, "last_planned_at")?,
        is_active: row.get("is_active")?,
    })
}

#[async_trait]
impl ImprovementStore for Database {
    async fn active_improvements(&self, owner_id: &str) -> Result<Vec<Improvement>> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, title, priority, effort_minutes, category, cooldown_days,
                        last_done_at, last_planned_at, is_active
                 FROM improvements
                 WHERE owner_id = ?1 AND is_active = 1
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![owner_id])?;
            let mut improvements = Vec::new();
            while let Some(row) = rows.next()? {
                improvements.push(row_to_improvement(row)?);
            }
            Ok(improvements)
        })
        .await
    }

    async fn insert_improvement(&self, improvement: &Improvement) -> Result<()> {
        let record = improvement.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO improvements (id, owner_id, title, priority, effort_minutes, category,
                                           cooldown_days, last_done_at, last_planned_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.owner_id,
                    record.title,
                    record.priority,
                    record.effort_minutes,
                    record.category,
                    record.cooldown_days,
                    record.last_done_at.map(day_param),
                    record.last_planned_at.map(day_param),
                    record.is_active,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn mark_improvements_planned(
        &self,
        ids: &[String],
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut values = vec![day_param(date), owner_id.to_string()];
        values.extend(ids.iter().cloned());
        let count = ids.len();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE improvements SET last_planned_at = ?
                 WHERE owner_id = ? AND id IN ({})",
                placeholders(count)
            );
            conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn improvement(id: &str, active: bool) -> Improvement {
        Improvement {
            id: id.into(),
            owner_id: "owner".into(),
            title: format!("improve {id}"),
            priority: Some(2),
            effort_minutes: Some(15),
            category: Some("home".into()),
            cooldown_days: None,
            last_done_at: None,
            last_planned_at: None,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn only_active_rows_are_listed_and_marked() {
        let db = Database::open_in_memory().unwrap();
        db.insert_improvement(&improvement("a", true)).await.unwrap();
        db.insert_improvement(&improvement("b", false)).await.unwrap();

        let active = db.active_improvements("owner").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        db.mark_improvements_planned(&["a".to_string()], "owner", today)
            .await
            .unwrap();
        let active = db.active_improvements("owner").await.unwrap();
        assert_eq!(active[0].last_planned_at, Some(today));
    }
}
