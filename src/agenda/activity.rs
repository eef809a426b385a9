//! The projected agenda item and its kind.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::agenda::clock::MinuteOfDay;
use crate::db::models::{RoutineRecord, TaskRecord};
use crate::store::Channel;

pub const DEFAULT_TASK_MINUTES: u16 = 30;
pub const REQUIREMENT_TASK_MINUTES: u16 = 15;
pub const IMPROVEMENT_TASK_MINUTES: u16 = 25;

/// What an agenda row is. Each variant carries only the links valid for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActivityKind {
    Task,
    Routine,
    #[serde(rename_all = "camelCase")]
    RequirementTask {
        appointment_id: String,
        requirement_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    ImprovementTask { improvement_id: String },
    /// A plain task generated for a document. The link itself lives on
    /// [`Activity::document`], since any task kind may carry one.
    DocumentTask,
}

impl ActivityKind {
    /// Length of a slot carved for this kind when nothing else bounds it.
    pub fn default_duration(&self) -> u16 {
        match self {
            ActivityKind::RequirementTask { .. } => REQUIREMENT_TASK_MINUTES,
            ActivityKind::ImprovementTask { .. } => IMPROVEMENT_TASK_MINUTES,
            _ => DEFAULT_TASK_MINUTES,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Task => "Task",
            ActivityKind::Routine => "Routine",
            ActivityKind::RequirementTask { .. } => "Requirement",
            ActivityKind::ImprovementTask { .. } => "Improvement",
            ActivityKind::DocumentTask => "Document",
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, ActivityKind::Routine)
    }
}

/// Document whose expiry a task counts down to. `days_left` is unknown until
/// the expiry has been looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLink {
    pub document_id: String,
    pub days_left: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub description: String,
    pub date: NaiveDate,
    pub start: Option<MinuteOfDay>,
    pub end: Option<MinuteOfDay>,
    pub completed: bool,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub priority: Option<i64>,
    pub kind: ActivityKind,
    pub document: Option<DocumentLink>,
    /// Channel the row was last seen on during the merge.
    pub channel: Channel,
}

impl Activity {
    pub fn from_task(task: TaskRecord, channel: Channel) -> Self {
        let kind = match (
            task.appointment_id,
            task.requirement_index,
            task.improvement_id,
            &task.document_id,
        ) {
            (Some(appointment_id), Some(requirement_index), _, _) => {
                ActivityKind::RequirementTask {
                    appointment_id,
                    requirement_index,
                }
            }
            (_, _, Some(improvement_id), _) => ActivityKind::ImprovementTask { improvement_id },
            (_, _, _, Some(_)) => ActivityKind::DocumentTask,
            _ => ActivityKind::Task,
        };
        let document = task.document_id.map(|document_id| DocumentLink {
            document_id,
            days_left: None,
        });

        Self {
            id: task.id,
            description: task.description.unwrap_or_default(),
            date: task.due_date,
            start: task.start_time,
            end: task.end_time,
            completed: task.is_completed,
            owner_id: task.owner_id,
            group_id: task.group_id,
            priority: task.priority,
            kind,
            document,
            channel,
        }
    }

    /// Projects a routine onto `date`. A routine counts as done once its end
    /// minute has been reached.
    pub fn from_routine(
        routine: RoutineRecord,
        date: NaiveDate,
        now: MinuteOfDay,
        channel: Channel,
    ) -> Self {
        let completed = routine.end_time.map_or(false, |end| now >= end);
        Self {
            id: routine.id,
            description: routine.description.unwrap_or_default(),
            date,
            start: routine.start_time,
            end: routine.end_time,
            completed,
            owner_id: routine.owner_id,
            group_id: routine.group_id,
            priority: None,
            kind: ActivityKind::Routine,
            document: None,
            channel,
        }
    }

    pub fn default_duration(&self) -> u16 {
        self.kind.default_duration()
    }

    pub fn is_fixed(&self) -> bool {
        self.kind.is_fixed()
    }

    /// Only open tasks can be dragged to a new slot.
    pub fn is_movable(&self) -> bool {
        !self.is_fixed() && !self.completed
    }

    /// `(start, end)` when both are present and form a non-empty range.
    pub fn span(&self) -> Option<(MinuteOfDay, MinuteOfDay)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        }
    }

    pub fn document_days_left(&self) -> Option<i64> {
        self.document.as_ref().and_then(|link| link.days_left)
    }

    /// Any task linked to a document, whatever its kind.
    pub fn is_document(&self) -> bool {
        self.document.is_some()
    }

    /// Requirement and document tasks are owned by their source.
    pub fn is_deletable(&self) -> bool {
        !matches!(self.kind, ActivityKind::RequirementTask { .. }) && !self.is_document()
    }
}
