use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use crate::agenda::clock::{format_date, parse_date, MinuteOfDay};
use crate::db::models::Requirement;

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_optional_usize(value: Option<i64>, field: &str) -> Result<Option<usize>> {
    value.map(|raw| to_usize(raw, field)).transpose()
}

pub fn parse_day(value: &str, field: &str) -> Result<NaiveDate> {
    parse_date(value).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_day(value: Option<String>, field: &str) -> Result<Option<NaiveDate>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_day(raw, field).map(Some),
    }
}

pub fn parse_time(value: Option<String>, field: &str) -> Result<Option<MinuteOfDay>> {
    MinuteOfDay::parse_optional(value.as_deref()).with_context(|| format!("failed to parse {field}"))
}

pub fn day_param(date: NaiveDate) -> String {
    format_date(date)
}

pub fn time_param(time: Option<MinuteOfDay>) -> Option<String> {
    time.map(|t| t.to_string())
}

pub fn parse_requirements(raw: &str) -> Result<Vec<Requirement>> {
    serde_json::from_str(raw).context("failed to parse requirements list")
}

pub fn parse_days_of_week(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).context("failed to parse days_of_week")
}

/// Expands to `?, ?, ?` for an `IN (...)` clause.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_match_count() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn blank_dates_are_absent() {
        assert_eq!(parse_optional_day(Some(" ".into()), "end_date").unwrap(), None);
        assert!(parse_optional_day(Some("31/12/2026".into()), "end_date").is_err());
    }

    #[test]
    fn requirements_tolerate_missing_fields() {
        let reqs = parse_requirements(r#"[{"text":"bring ID"},{"checked":true}]"#).unwrap();
        assert_eq!(reqs[0], Requirement::new("bring ID"));
        assert!(reqs[1].checked);
        assert!(reqs[1].text.is_empty());
    }
}
