//! Improvement backlog items: small recurring chores planned into the day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub priority: Option<i64>,
    pub effort_minutes: Option<u32>,
    pub category: Option<String>,
    pub cooldown_days: Option<i64>,
    pub last_done_at: Option<NaiveDate>,
    pub last_planned_at: Option<NaiveDate>,
    pub is_active: bool,
}
