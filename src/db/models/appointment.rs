use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::agenda::clock::MinuteOfDay;

/// One checklist entry embedded in an appointment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

impl Requirement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            checked: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<MinuteOfDay>,
    pub end_time: Option<MinuteOfDay>,
    pub requirements: Vec<Requirement>,
}
