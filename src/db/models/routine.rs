use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::agenda::clock::{parse_weekday, MinuteOfDay};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRecord {
    pub id: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Day names as stored; English or Spanish.
    pub days_of_week: Vec<String>,
    pub start_time: Option<MinuteOfDay>,
    pub end_time: Option<MinuteOfDay>,
    pub is_active: bool,
}

impl RoutineRecord {
    /// Whether the routine recurs on `date`: weekday listed and date inside
    /// the `[start_date, end_date]` window.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;

        let weekday: Weekday = date.weekday();
        let listed = self
            .days_of_week
            .iter()
            .filter_map(|name| parse_weekday(name))
            .any(|day| day == weekday);

        listed
            && self.start_date <= date
            && self.end_date.map_or(true, |end| date <= end)
    }
}

/// Field-level edit of a routine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutinePatch {
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<Option<MinuteOfDay>>,
    pub end_time: Option<Option<MinuteOfDay>>,
}
