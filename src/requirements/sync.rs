//! Keeps appointment checklists and their mirror tasks in step.
//!
//! Each requirement at index `i` of an appointment is mirrored by one task
//! keyed `(appointment_id, i)` whose completion equals the requirement's
//! `checked` flag. Both rows are written explicitly; nothing is rolled back
//! when one of the writes fails.

use std::collections::BTreeSet;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::{Appointment, Requirement, RequirementTaskUpsert, TaskRecord};
use crate::store::{AppointmentStore, TaskStore};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Which halves of a dual write landed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorOutcome {
    pub appointment_written: bool,
    pub task_written: bool,
    pub errors: Vec<String>,
}

impl MirrorOutcome {
    pub fn is_consistent(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskToggle {
    pub task_id: String,
    pub completed: bool,
    /// Present when the task mirrors a requirement.
    pub mirror: Option<MirrorOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementEdit {
    pub upserted: Vec<usize>,
    pub deleted: Vec<usize>,
}

pub fn mirror_description(appointment: &Appointment, requirement: &Requirement) -> String {
    format!(
        "[Appointment] {} — {}",
        appointment.description.as_deref().unwrap_or_default().trim(),
        requirement.text.trim()
    )
}

fn mirror_row(
    appointment: &Appointment,
    owner_id: &str,
    index: usize,
    requirement: &Requirement,
    today: NaiveDate,
) -> RequirementTaskUpsert {
    RequirementTaskUpsert {
        owner_id: owner_id.to_string(),
        group_id: appointment.group_id.clone(),
        appointment_id: appointment.id.clone(),
        requirement_index: index,
        description: mirror_description(appointment, requirement),
        due_date: today,
        is_completed: requirement.checked,
    }
}

async fn load_appointment<S>(store: &S, appointment_id: &str) -> Result<Appointment>
where
    S: AppointmentStore + ?Sized,
{
    store
        .get_appointment(appointment_id)
        .await?
        .ok_or_else(|| anyhow!("Appointment {appointment_id} not found"))
}

/// Checks or unchecks one requirement and upserts its mirror task, due
/// `today` and owned by `owner_id`.
pub async fn set_requirement_checked<S>(
    store: &S,
    owner_id: &str,
    appointment_id: &str,
    index: usize,
    checked: bool,
    today: NaiveDate,
) -> Result<MirrorOutcome>
where
    S: TaskStore + AppointmentStore + ?Sized,
{
    let mut appointment = load_appointment(store, appointment_id).await?;
    let count = appointment.requirements.len();
    let Some(requirement) = appointment.requirements.get_mut(index) else {
        bail!("requirement index {index} out of range: appointment {appointment_id} has {count}");
    };
    requirement.checked = checked;

    let mut outcome = MirrorOutcome::default();

    match store
        .update_requirements(appointment_id, &appointment.requirements)
        .await
    {
        Ok(()) => outcome.appointment_written = true,
        Err(err) => {
            log_error!("failed to store requirement {index} of {appointment_id}: {err:?}");
            outcome.errors.push(err.to_string());
        }
    }

    let row = mirror_row(
        &appointment,
        owner_id,
        index,
        &appointment.requirements[index],
        today,
    );
    match store.upsert_requirement_task(&row).await {
        Ok(()) => outcome.task_written = true,
        Err(err) => {
            log_error!("failed to mirror requirement {index} of {appointment_id}: {err:?}");
            outcome.errors.push(err.to_string());
        }
    }

    Ok(outcome)
}

/// Flips a task's completion. Requirement tasks carry the new state back
/// into their appointment's checklist.
pub async fn toggle_task_completion<S>(store: &S, task_id: &str) -> Result<TaskToggle>
where
    S: TaskStore + AppointmentStore + ?Sized,
{
    let task = store
        .get_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("Task {task_id} not found"))?;
    let completed = !task.is_completed;
    store.set_task_completed(task_id, completed).await?;

    let mirror = match task.requirement_link() {
        Some((appointment_id, index)) => {
            let mut outcome = MirrorOutcome {
                task_written: true,
                ..MirrorOutcome::default()
            };
            match write_requirement_state(store, appointment_id, index, completed).await {
                Ok(()) => outcome.appointment_written = true,
                Err(err) => {
                    log_error!(
                        "task {task_id} toggled but requirement {index} of {appointment_id} was not: {err:?}"
                    );
                    outcome.errors.push(err.to_string());
                }
            }
            Some(outcome)
        }
        None => None,
    };

    Ok(TaskToggle {
        task_id: task_id.to_string(),
        completed,
        mirror,
    })
}

async fn write_requirement_state<S>(
    store: &S,
    appointment_id: &str,
    index: usize,
    checked: bool,
) -> Result<()>
where
    S: AppointmentStore + ?Sized,
{
    let mut appointment = load_appointment(store, appointment_id).await?;
    let count = appointment.requirements.len();
    let requirement = appointment.requirements.get_mut(index).ok_or_else(|| {
        anyhow!("requirement index {index} out of range: appointment {appointment_id} has {count}")
    })?;
    if requirement.checked == checked {
        return Ok(());
    }
    requirement.checked = checked;
    store
        .update_requirements(appointment_id, &appointment.requirements)
        .await
}

/// Replaces an appointment's checklist and reconciles its mirror tasks:
/// every index is upserted, tasks for indices past the new end are deleted.
pub async fn edit_requirements<S>(
    store: &S,
    owner_id: &str,
    appointment_id: &str,
    requirements: Vec<Requirement>,
    today: NaiveDate,
) -> Result<RequirementEdit>
where
    S: TaskStore + AppointmentStore + ?Sized,
{
    let mut appointment = load_appointment(store, appointment_id).await?;
    store
        .update_requirements(appointment_id, &requirements)
        .await?;
    appointment.requirements = requirements;

    let mut edit = RequirementEdit::default();
    for (index, requirement) in appointment.requirements.iter().enumerate() {
        let row = mirror_row(&appointment, owner_id, index, requirement, today);
        store.upsert_requirement_task(&row).await?;
        edit.upserted.push(index);
    }

    let live = appointment.requirements.len();
    edit.deleted = store
        .requirement_task_indices(appointment_id)
        .await?
        .into_iter()
        .filter(|index| *index >= live)
        .collect();
    if !edit.deleted.is_empty() {
        store
            .delete_requirement_tasks(appointment_id, &edit.deleted)
            .await?;
        log_info!(
            "removed {} stale requirement tasks of {}",
            edit.deleted.len(),
            appointment_id
        );
    }

    Ok(edit)
}

/// Unchecks the given requirements. Missing appointments and out-of-range
/// indices are ignored. Returns how many requirements changed.
pub async fn uncheck_requirements<S>(
    store: &S,
    appointment_id: &str,
    indices: &BTreeSet<usize>,
) -> Result<usize>
where
    S: AppointmentStore + ?Sized,
{
    let Some(mut appointment) = store.get_appointment(appointment_id).await? else {
        return Ok(0);
    };

    let mut changed = 0;
    for (index, requirement) in appointment.requirements.iter_mut().enumerate() {
        if indices.contains(&index) && requirement.checked {
            requirement.checked = false;
            changed += 1;
        }
    }
    if changed > 0 {
        store
            .update_requirements(appointment_id, &appointment.requirements)
            .await?;
    }
    Ok(changed)
}

/// A requirement task that disappeared unchecks its requirement.
pub async fn handle_task_deleted<S>(store: &S, task: &TaskRecord) -> Result<bool>
where
    S: AppointmentStore + ?Sized,
{
    let Some((appointment_id, index)) = task.requirement_link() else {
        return Ok(false);
    };
    let changed = uncheck_requirements(store, appointment_id, &BTreeSet::from([index])).await?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::{AgendaSource, Scope};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    async fn seeded(requirements: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        let appointment = Appointment {
            id: "x".into(),
            owner_id: "ana".into(),
            group_id: Some("family".into()),
            description: Some("Passport office".into()),
            date: NaiveDate::from_ymd_opt(2026, 10, 23),
            start_time: None,
            end_time: None,
            requirements: requirements.iter().map(|text| Requirement::new(*text)).collect(),
        };
        db.insert_appointment(&appointment).await.unwrap();
        db
    }

    async fn mirror_tasks(db: &Database) -> Vec<TaskRecord> {
        let mut tasks = db.tasks_due(Scope::Owner("ana"), today()).await.unwrap();
        tasks.sort_by_key(|task| task.requirement_index);
        tasks
    }

    async fn assert_mirrored(db: &Database) {
        let appointment = db.get_appointment("x").await.unwrap().unwrap();
        let tasks = mirror_tasks(db).await;
        assert_eq!(tasks.len(), appointment.requirements.len());
        for (index, (task, requirement)) in tasks.iter().zip(&appointment.requirements).enumerate() {
            assert_eq!(task.requirement_index, Some(index));
            assert_eq!(task.is_completed, requirement.checked);
        }
    }

    #[tokio::test]
    async fn checking_a_requirement_upserts_its_task() {
        let db = seeded(&["bring ID", "arrive early"]).await;

        let outcome = set_requirement_checked(&db, "ana", "x", 1, true, today()).await.unwrap();
        assert!(outcome.is_consistent());
        assert!(outcome.appointment_written && outcome.task_written);

        let appointment = db.get_appointment("x").await.unwrap().unwrap();
        assert!(appointment.requirements[1].checked);
        assert!(!appointment.requirements[0].checked);

        let tasks = mirror_tasks(&db).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].requirement_link(), Some(("x", 1)));
        assert!(tasks[0].is_completed);
        assert_eq!(tasks[0].group_id.as_deref(), Some("family"));
        assert_eq!(
            tasks[0].description.as_deref(),
            Some("[Appointment] Passport office — arrive early")
        );
    }

    #[tokio::test]
    async fn out_of_range_index_writes_nothing() {
        let db = seeded(&["bring ID"]).await;
        assert!(set_requirement_checked(&db, "ana", "x", 3, true, today()).await.is_err());
        assert!(mirror_tasks(&db).await.is_empty());
        assert!(set_requirement_checked(&db, "ana", "missing", 0, true, today()).await.is_err());
    }

    #[tokio::test]
    async fn toggling_the_task_updates_the_requirement() {
        let db = seeded(&["bring ID", "arrive early"]).await;
        set_requirement_checked(&db, "ana", "x", 0, false, today()).await.unwrap();
        let task_id = mirror_tasks(&db).await[0].id.clone();

        let toggle = toggle_task_completion(&db, &task_id).await.unwrap();
        assert!(toggle.completed);
        assert_eq!(toggle.mirror.map(|m| m.is_consistent()), Some(true));
        let appointment = db.get_appointment("x").await.unwrap().unwrap();
        assert!(appointment.requirements[0].checked);

        let plain = TaskRecord::new("ana", "water plants", today());
        db.insert_task(&plain).await.unwrap();
        let toggle = toggle_task_completion(&db, &plain.id).await.unwrap();
        assert!(toggle.completed);
        assert!(toggle.mirror.is_none());
    }

    #[tokio::test]
    async fn editing_the_list_reconciles_tasks() {
        let db = seeded(&["bring ID", "arrive early", "pay fee"]).await;
        edit_requirements(
            &db,
            "ana",
            "x",
            vec![
                Requirement::new("bring ID"),
                Requirement::new("arrive early"),
                Requirement::new("pay fee"),
            ],
            today(),
        )
        .await
        .unwrap();
        assert_mirrored(&db).await;

        let shorter = vec![
            Requirement {
                text: "bring ID".into(),
                checked: true,
            },
            Requirement::new("photo"),
        ];
        let edit = edit_requirements(&db, "ana", "x", shorter, today()).await.unwrap();
        assert_eq!(edit.upserted, vec![0, 1]);
        assert_eq!(edit.deleted, vec![2]);
        assert_mirrored(&db).await;

        let tasks = mirror_tasks(&db).await;
        assert_eq!(
            tasks[1].description.as_deref(),
            Some("[Appointment] Passport office — photo")
        );
    }

    #[tokio::test]
    async fn mirror_holds_across_mixed_operations() {
        let db = seeded(&["a", "b", "c"]).await;
        edit_requirements(
            &db,
            "ana",
            "x",
            vec![Requirement::new("a"), Requirement::new("b"), Requirement::new("c")],
            today(),
        )
        .await
        .unwrap();

        set_requirement_checked(&db, "ana", "x", 2, true, today()).await.unwrap();
        assert_mirrored(&db).await;
        set_requirement_checked(&db, "ana", "x", 0, true, today()).await.unwrap();
        set_requirement_checked(&db, "ana", "x", 2, false, today()).await.unwrap();
        assert_mirrored(&db).await;

        let task_id = mirror_tasks(&db).await[1].id.clone();
        toggle_task_completion(&db, &task_id).await.unwrap();
        assert_mirrored(&db).await;

        let current = db.get_appointment("x").await.unwrap().unwrap().requirements;
        edit_requirements(&db, "ana", "x", current[..1].to_vec(), today())
            .await
            .unwrap();
        assert_mirrored(&db).await;
    }

    #[tokio::test]
    async fn deleted_requirement_task_unchecks() {
        let db = seeded(&["bring ID"]).await;
        set_requirement_checked(&db, "ana", "x", 0, true, today()).await.unwrap();
        let task = mirror_tasks(&db).await.remove(0);
        db.delete_task(&task.id).await.unwrap();

        assert!(handle_task_deleted(&db, &task).await.unwrap());
        let appointment = db.get_appointment("x").await.unwrap().unwrap();
        assert!(!appointment.requirements[0].checked);

        assert!(!handle_task_deleted(&db, &task).await.unwrap());
        let plain = TaskRecord::new("ana", "plain", today());
        assert!(!handle_task_deleted(&db, &plain).await.unwrap());
    }
}
