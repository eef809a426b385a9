//! Group membership, share links and document expiries: the lookups that
//! decide which rows reach a user besides their own.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter};

use crate::db::{
    helpers::{day_param, parse_optional_day, placeholders},
    models::{RoutineRecord, TaskRecord},
    Database,
};
use crate::store::{AgendaSource, Scope, SharedKind};

#[async_trait]
impl AgendaSource for Database {
    async fn group_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY group_id ASC",
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }

    async fn shared_ids(&self, user_id: &str, kind: SharedKind) -> Result<Vec<String>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT activity_id FROM shared_activities
                 WHERE user_id = ?1 AND kind = ?2
                 ORDER BY activity_id ASC",
            )?;
            let mut rows = stmt.query(params![user_id, kind.as_str()])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }

    async fn tasks_due(&self, scope: Scope<'_>, date: NaiveDate) -> Result<Vec<TaskRecord>> {
        self.query_tasks_due(scope, date).await
    }

    async fn active_routines(&self, scope: Scope<'_>) -> Result<Vec<RoutineRecord>> {
        self.query_active_routines(scope).await
    }

    async fn document_expiries(&self, ids: &[String]) -> Result<HashMap<String, NaiveDate>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT id, expires_on FROM documents WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(ids.iter()))?;
            let mut expiries = HashMap::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let expires_on: Option<String> = row.get(1)?;
                if let Some(date) = parse_optional_day(expires_on, "expires_on")? {
                    expiries.insert(id, date);
                }
            }
            Ok(expiries)
        })
        .await
    }
}

impl Database {
    pub async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let group_id = group_id.to_string();
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![group_id, user_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn share_activity(
        &self,
        activity_id: &str,
        user_id: &str,
        kind: SharedKind,
    ) -> Result<()> {
        let activity_id = activity_id.to_string();
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO shared_activities (activity_id, user_id, kind)
                 VALUES (?1, ?2, ?3)",
                params![activity_id, user_id, kind.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_document(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        expires_on: Option<NaiveDate>,
    ) -> Result<()> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        let title = title.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, owner_id, title, expires_on) VALUES (?1, ?2, ?3, ?4)",
                params![id, owner_id, title, expires_on.map(day_param)],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn membership_and_share_lookups() {
        let db = Database::open_in_memory().unwrap();
        db.add_group_member("g2", "ana").await.unwrap();
        db.add_group_member("g1", "ana").await.unwrap();
        db.add_group_member("g1", "ana").await.unwrap();
        db.share_activity("t1", "ana", SharedKind::Task).await.unwrap();
        db.share_activity("r1", "ana", SharedKind::Routine).await.unwrap();

        assert_eq!(db.group_ids("ana").await.unwrap(), vec!["g1", "g2"]);
        assert_eq!(db.shared_ids("ana", SharedKind::Task).await.unwrap(), vec!["t1"]);
        assert_eq!(db.shared_ids("ana", SharedKind::Routine).await.unwrap(), vec!["r1"]);
        assert!(db.group_ids("luis").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn documents_without_expiry_are_absent() {
        let db = Database::open_in_memory().unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        db.insert_document("d1", "ana", "Passport", Some(expiry)).await.unwrap();
        db.insert_document("d2", "ana", "Warranty", None).await.unwrap();

        let ids = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];
        let expiries = db.document_expiries(&ids).await.unwrap();
        assert_eq!(expiries.len(), 1);
        assert_eq!(expiries.get("d1"), Some(&expiry));
    }
}
