//! Date and time-of-day value types shared by the agenda.
//!
//! All wall-clock parsing and formatting goes through [`MinuteOfDay`] and the
//! helpers in this module; nothing else in the crate splits `HH:MM` strings.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 1440;

/// Whole minutes since local midnight, `0..=1440`.
///
/// `1440` is the end-of-day boundary: it is a valid interval end but never a
/// start the clock can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);
    pub const END_OF_DAY: MinuteOfDay = MinuteOfDay(MINUTES_PER_DAY);

    pub fn new(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hours: u16, minutes: u16) -> Option<Self> {
        if minutes >= 60 {
            return None;
        }
        Self::new(hours.checked_mul(60)?.checked_add(minutes)?)
    }

    pub fn from_time(time: NaiveDateTime) -> Self {
        // hour() <= 23 and minute() <= 59, so this is always < 1440
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Adds a signed number of minutes, wrapping around midnight.
    pub fn add_wrapping(self, delta: i32) -> Self {
        let day = i32::from(MINUTES_PER_DAY);
        let total = (i32::from(self.0) + delta).rem_euclid(day);
        // rem_euclid keeps the value in 0..1440
        Self(total as u16)
    }

    /// Parses `HH:MM`, `HH:MM:SS` or `HH:MM:SS.ffffff`. Seconds are dropped.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let mut parts = value.split(':');
        let hours = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow!("missing hours in time '{value}'"))?;
        let minutes = parts
            .next()
            .ok_or_else(|| anyhow!("missing minutes in time '{value}'"))?;

        if let Some(seconds) = parts.next() {
            let whole = seconds.split('.').next().unwrap_or_default();
            whole
                .parse::<u8>()
                .ok()
                .filter(|s| *s < 60)
                .ok_or_else(|| anyhow!("invalid seconds in time '{value}'"))?;
        }
        if parts.next().is_some() {
            bail!("too many components in time '{value}'");
        }

        let hours: u16 = hours
            .parse()
            .with_context(|| format!("invalid hours in time '{value}'"))?;
        let minutes: u16 = minutes
            .parse()
            .with_context(|| format!("invalid minutes in time '{value}'"))?;

        match Self::from_hm(hours, minutes) {
            Some(parsed) if parsed.0 < MINUTES_PER_DAY || value.starts_with("24:00") => {
                Ok(parsed)
            }
            _ => bail!("time '{value}' is outside the day"),
        }
    }

    /// Lenient parse for optional columns: empty strings are "no time".
    pub fn parse_optional(value: Option<&str>) -> Result<Option<Self>> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Self::parse(raw).map(Some),
        }
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for MinuteOfDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MinuteOfDay {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MinuteOfDay> for String {
    fn from(value: MinuteOfDay) -> Self {
        value.to_string()
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    // Tolerate timestamps; only the calendar date matters here.
    let date_part = value.trim().get(..10).unwrap_or(value.trim());
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}'"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// Parses English (`Mon`, `monday`) or Spanish (`lunes`, `Miércoles`) day names.
pub fn parse_weekday(value: &str) -> Option<Weekday> {
    let lowered = value.trim().to_lowercase();
    let spanish = match lowered.as_str() {
        "lunes" => Some(Weekday::Mon),
        "martes" => Some(Weekday::Tue),
        "miércoles" | "miercoles" => Some(Weekday::Wed),
        "jueves" => Some(Weekday::Thu),
        "viernes" => Some(Weekday::Fri),
        "sábado" | "sabado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        _ => None,
    };
    spanish.or_else(|| lowered.parse::<Weekday>().ok())
}

/// Source of "now" for the agenda, in local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn minute_of_day(&self) -> MinuteOfDay {
        MinuteOfDay::from_time(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(value: &str) -> MinuteOfDay {
        MinuteOfDay::parse(value).unwrap()
    }

    #[test]
    fn parses_database_time_formats() {
        assert_eq!(m("09:30").minutes(), 570);
        assert_eq!(m("09:30:59").minutes(), 570);
        assert_eq!(m("23:59:00.123456").minutes(), 1439);
        assert_eq!(m("24:00").minutes(), 1440);
        assert!(MinuteOfDay::parse("24:01").is_err());
        assert!(MinuteOfDay::parse("12:60").is_err());
        assert!(MinuteOfDay::parse("noon").is_err());
        assert!(MinuteOfDay::parse(":30").is_err());
    }

    #[test]
    fn formats_zero_padded() {
        assert_eq!(MinuteOfDay::new(5).unwrap().to_string(), "00:05");
        assert_eq!(MinuteOfDay::END_OF_DAY.to_string(), "24:00");
    }

    #[test]
    fn wraps_around_midnight() {
        assert_eq!(m("23:50").add_wrapping(30).to_string(), "00:20");
        assert_eq!(m("00:10").add_wrapping(-30).to_string(), "23:40");
    }

    #[test]
    fn optional_times_treat_blank_as_none() {
        assert_eq!(MinuteOfDay::parse_optional(Some("  ")).unwrap(), None);
        assert_eq!(MinuteOfDay::parse_optional(None).unwrap(), None);
        assert_eq!(
            MinuteOfDay::parse_optional(Some("08:00")).unwrap(),
            Some(m("08:00"))
        );
    }

    #[test]
    fn weekday_names_in_both_languages() {
        assert_eq!(parse_weekday("Miércoles"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("sabado"), Some(Weekday::Sat));
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("sun"), Some(Weekday::Sun));
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn dates_accept_timestamps() {
        let date = parse_date("2026-10-19T08:00:00Z").unwrap();
        assert_eq!(format_date(date), "2026-10-19");
        let later = NaiveDate::from_ymd_opt(2026, 10, 22).unwrap();
        assert_eq!(days_until(later, date), 3);
        assert_eq!(days_until(date, later), -3);
    }
}
