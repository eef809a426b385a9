//! Data contracts between the agenda and whatever holds the rows.
//!
//! The agenda never owns authoritative state: it reads through
//! [`AgendaSource`], writes through the store traits, and re-reads after
//! every mutation. [`crate::db::Database`] implements all of them over
//! SQLite; a hosted backend would implement the same traits.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::agenda::clock::MinuteOfDay;
use crate::db::models::{
    Appointment, Improvement, ImprovementTaskUpsert, Requirement, RequirementTaskUpsert,
    RoutinePatch, RoutineRecord, TaskPatch, TaskRecord,
};

/// Where a row reached the user from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Owned,
    Group,
    Shared,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Owned => "owned",
            Channel::Group => "group",
            Channel::Shared => "shared",
        }
    }
}

/// Kind column of the share-link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedKind {
    Task,
    Routine,
}

impl SharedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharedKind::Task => "task",
            SharedKind::Routine => "routine",
        }
    }
}

/// Row filter for one provenance channel.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Owner(&'a str),
    Groups(&'a [String]),
    Ids(&'a [String]),
}

impl Scope<'_> {
    pub fn channel(&self) -> Channel {
        match self {
            Scope::Owner(_) => Channel::Owned,
            Scope::Groups(_) => Channel::Group,
            Scope::Ids(_) => Channel::Shared,
        }
    }
}

/// Read contract for building today's agenda.
#[async_trait]
pub trait AgendaSource: Send + Sync {
    async fn group_ids(&self, user_id: &str) -> Result<Vec<String>>;

    async fn shared_ids(&self, user_id: &str, kind: SharedKind) -> Result<Vec<String>>;

    async fn tasks_due(&self, scope: Scope<'_>, date: NaiveDate) -> Result<Vec<TaskRecord>>;

    async fn active_routines(&self, scope: Scope<'_>) -> Result<Vec<RoutineRecord>>;

    /// Expiry date per document id. Unknown ids are simply absent.
    async fn document_expiries(&self, ids: &[String]) -> Result<HashMap<String, NaiveDate>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>>;

    async fn insert_task(&self, task: &TaskRecord) -> Result<()>;

    async fn update_task_times(&self, id: &str, start: MinuteOfDay, end: MinuteOfDay)
        -> Result<()>;

    async fn set_task_completed(&self, id: &str, completed: bool) -> Result<()>;

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<()>;

    async fn delete_task(&self, id: &str) -> Result<()>;

    async fn completed_tasks_before(&self, owner_id: &str, date: NaiveDate)
        -> Result<Vec<TaskRecord>>;

    async fn delete_tasks(&self, ids: &[String]) -> Result<usize>;

    /// Moves the owner's incomplete tasks due before `today` onto `today`.
    /// Improvement-linked tasks stay where they are.
    async fn roll_forward_incomplete(&self, owner_id: &str, today: NaiveDate) -> Result<usize>;

    async fn upsert_requirement_task(&self, row: &RequirementTaskUpsert) -> Result<()>;

    async fn requirement_task_indices(&self, appointment_id: &str) -> Result<Vec<usize>>;

    async fn delete_requirement_tasks(&self, appointment_id: &str, indices: &[usize])
        -> Result<usize>;

    async fn has_improvement_tasks(&self, owner_id: &str, date: NaiveDate) -> Result<bool>;

    async fn upsert_improvement_tasks(&self, rows: &[ImprovementTaskUpsert]) -> Result<()>;
}

#[async_trait]
pub trait RoutineStore: Send + Sync {
    async fn get_routine(&self, id: &str) -> Result<Option<RoutineRecord>>;

    async fn insert_routine(&self, routine: &RoutineRecord) -> Result<()>;

    async fn update_routine(&self, id: &str, patch: &RoutinePatch) -> Result<()>;

    async fn delete_routine(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()>;

    async fn update_requirements(&self, id: &str, requirements: &[Requirement]) -> Result<()>;
}

#[async_trait]
pub trait ImprovementStore: Send + Sync {
    async fn active_improvements(&self, owner_id: &str) -> Result<Vec<Improvement>>;

    async fn insert_improvement(&self, improvement: &Improvement) -> Result<()>;

    async fn mark_improvements_planned(
        &self,
        ids: &[String],
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<()>;
}

/// Everything the agenda controller needs from one backend.
pub trait AgendaBackend:
    AgendaSource + TaskStore + RoutineStore + AppointmentStore + ImprovementStore
{
}

impl<T> AgendaBackend for T where
    T: AgendaSource + TaskStore + RoutineStore + AppointmentStore + ImprovementStore
{
}
