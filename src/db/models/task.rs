//! Task rows and the write payloads that target them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::agenda::clock::MinuteOfDay;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub start_time: Option<MinuteOfDay>,
    pub end_time: Option<MinuteOfDay>,
    pub is_completed: bool,
    pub priority: Option<i64>,
    pub appointment_id: Option<String>,
    pub requirement_index: Option<usize>,
    pub improvement_id: Option<String>,
    pub document_id: Option<String>,
}

impl TaskRecord {
    pub fn new(owner_id: impl Into<String>, description: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            group_id: None,
            description: Some(description.into()),
            due_date,
            start_time: None,
            end_time: None,
            is_completed: false,
            priority: None,
            appointment_id: None,
            requirement_index: None,
            improvement_id: None,
            document_id: None,
        }
    }

    pub fn with_times(mut self, start: MinuteOfDay, end: MinuteOfDay) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// The appointment requirement this task mirrors, if any.
    pub fn requirement_link(&self) -> Option<(&str, usize)> {
        match (&self.appointment_id, self.requirement_index) {
            (Some(appointment_id), Some(index)) => Some((appointment_id.as_str(), index)),
            _ => None,
        }
    }
}

/// Field-level edit of a task. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// `Some(None)` clears the time.
    pub start_time: Option<Option<MinuteOfDay>>,
    pub end_time: Option<Option<MinuteOfDay>>,
}

/// Upsert payload keyed by `(appointment_id, requirement_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementTaskUpsert {
    pub owner_id: String,
    pub group_id: Option<String>,
    pub appointment_id: String,
    pub requirement_index: usize,
    pub description: String,
    pub due_date: NaiveDate,
    pub is_completed: bool,
}

/// Upsert payload keyed by `(improvement_id, due_date, owner_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementTaskUpsert {
    pub owner_id: String,
    pub improvement_id: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub priority: i64,
}
