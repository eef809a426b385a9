//! Temporal buckets, countdown text and the rendered card order.

use std::cmp::Ordering;

use serde::Serialize;

use crate::agenda::activity::Activity;
use crate::agenda::clock::MinuteOfDay;

/// Documents further out than this carry no expiry tag.
const EXPIRY_HORIZON_DAYS: i64 = 30;
const STARTS_SOON_MINUTES: u16 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    InProgress,
    Upcoming,
    Past,
    Untimed,
    Document,
    Completed,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::InProgress => "in-progress",
            Bucket::Upcoming => "upcoming",
            Bucket::Past => "past",
            Bucket::Untimed => "untimed",
            Bucket::Document => "document",
            Bucket::Completed => "completed",
        }
    }
}

pub fn classify(activity: &Activity, now: MinuteOfDay) -> Bucket {
    if activity.completed {
        return Bucket::Completed;
    }
    if activity.is_document() {
        return Bucket::Document;
    }
    match (activity.start, activity.end) {
        (Some(start), Some(end)) => {
            if now < start {
                Bucket::Upcoming
            } else if now < end {
                Bucket::InProgress
            } else {
                Bucket::Past
            }
        }
        _ => Bucket::Untimed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub text: String,
    pub starts_soon: bool,
    /// Started with no end to count down to.
    pub open_ended: bool,
}

impl Countdown {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            starts_soon: false,
            open_ended: false,
        }
    }
}

pub fn countdown(activity: &Activity, now: MinuteOfDay) -> Countdown {
    if activity.completed {
        return Countdown::plain("Completed");
    }
    let Some(start) = activity.start else {
        return Countdown::plain("No time");
    };

    if now < start {
        let minutes = start.minutes() - now.minutes();
        if minutes < 60 {
            return Countdown {
                text: format!("Starts in {minutes} min"),
                starts_soon: minutes < STARTS_SOON_MINUTES,
                open_ended: false,
            };
        }
        return Countdown::plain(format!("Starts in {} h {} min", minutes / 60, minutes % 60));
    }

    match activity.end {
        Some(end) if now < end => {
            let minutes = end.minutes() - now.minutes();
            if minutes < 60 {
                Countdown::plain(format!("Ends in {minutes} min"))
            } else if minutes % 60 == 0 {
                Countdown::plain(format!("Ends in {} h", minutes / 60))
            } else {
                Countdown::plain(format!("Ends in {} h {} min", minutes / 60, minutes % 60))
            }
        }
        Some(_) => Countdown::plain("Finished"),
        None => Countdown {
            text: "In progress".to_string(),
            starts_soon: false,
            open_ended: true,
        },
    }
}

pub fn expiry_tag(days_left: i64) -> Option<String> {
    match days_left {
        d if d < 0 => Some("EXPIRED".to_string()),
        0 => Some("EXPIRES TODAY".to_string()),
        d if d <= EXPIRY_HORIZON_DAYS => Some(format!("expires in {d} days")),
        _ => None,
    }
}

/// Drops a leading `[Tag]` marker written by the generators.
pub fn strip_tag(description: &str) -> &str {
    let trimmed = description.trim_start();
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let tag = &rest[..close];
            if !tag.is_empty() && tag.chars().all(char::is_alphabetic) {
                return rest[close + 1..].trim_start();
            }
        }
    }
    trimmed
}

fn format_time(time: Option<MinuteOfDay>) -> String {
    match time {
        Some(t) if t != MinuteOfDay::MIDNIGHT => t.to_string(),
        _ => String::new(),
    }
}

fn time_range(activity: &Activity) -> String {
    let start = format_time(activity.start);
    let end = format_time(activity.end);
    match (start.is_empty(), end.is_empty()) {
        (true, true) => String::new(),
        (false, true) => start,
        (true, false) => end,
        (false, false) => format!("{start} - {end}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaCard {
    pub id: String,
    pub label: &'static str,
    pub time_range: String,
    pub description: String,
    pub countdown: String,
    pub bucket: Bucket,
    pub draggable: bool,
    pub in_progress: bool,
    pub starts_soon: bool,
    pub deletable: bool,
    pub checkable: bool,
}

impl AgendaCard {
    pub fn render(activity: &Activity, now: MinuteOfDay) -> Self {
        let bucket = classify(activity, now);
        let countdown = countdown(activity, now);

        let mut description = strip_tag(&activity.description).to_string();
        if let Some(tag) = activity.document_days_left().and_then(expiry_tag) {
            description = format!("{description} ({tag})");
        }


        Self {
            id: activity.id.clone(),
            label: activity.kind.label(),
            time_range: time_range(activity),
            description,
            countdown: countdown.text,
            bucket,
            draggable: activity.is_movable(),
            in_progress: bucket == Bucket::InProgress || countdown.open_ended,
            starts_soon: countdown.starts_soon,
            deletable: activity.is_deletable(),
            checkable: !activity.is_fixed(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCounts {
    pub in_progress: usize,
    pub upcoming: usize,
    pub past: usize,
    pub untimed: usize,
    pub documents: usize,
    pub completed: usize,
}

impl BucketCounts {
    fn bump(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::InProgress => self.in_progress += 1,
            Bucket::Upcoming => self.upcoming += 1,
            Bucket::Past => self.past += 1,
            Bucket::Untimed => self.untimed += 1,
            Bucket::Document => self.documents += 1,
            Bucket::Completed => self.completed += 1,
        }
    }
}

/// Activities in display order. `open` is the draggable list; completed
/// items live in a folded section after it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaView {
    pub open: Vec<Activity>,
    pub completed: Vec<Activity>,
    pub cards: Vec<AgendaCard>,
    pub completed_cards: Vec<AgendaCard>,
    pub counts: BucketCounts,
}

fn compare_within(bucket: Bucket, a: &Activity, b: &Activity) -> Ordering {
    match bucket {
        Bucket::InProgress | Bucket::Upcoming => a.start.cmp(&b.start),
        Bucket::Past => b.end.cmp(&a.end),
        Bucket::Untimed => a.description.to_lowercase().cmp(&b.description.to_lowercase()),
        Bucket::Document => {
            let urgency = |activity: &Activity| activity.document_days_left().unwrap_or(i64::MAX);
            urgency(a)
                .cmp(&urgency(b))
                .then_with(|| a.description.cmp(&b.description))
        }
        Bucket::Completed => Ordering::Equal,
    }
}

impl AgendaView {
    pub fn build(activities: Vec<Activity>, now: MinuteOfDay) -> Self {
        let mut keyed: Vec<(Bucket, Activity)> = activities
            .into_iter()
            .map(|activity| (classify(&activity, now), activity))
            .collect();
        // Stable, so completed items keep their fetch order.
        keyed.sort_by(|(bucket_a, a), (bucket_b, b)| {
            bucket_a
                .cmp(bucket_b)
                .then_with(|| compare_within(*bucket_a, a, b))
        });

        let mut view = AgendaView::default();
        for (bucket, activity) in keyed {
            view.counts.bump(bucket);
            let card = AgendaCard::render(&activity, now);
            if bucket == Bucket::Completed {
                view.completed_cards.push(card);
                view.completed.push(activity);
            } else {
                view.cards.push(card);
                view.open.push(activity);
            }
        }
        view
    }

    pub fn find(&self, id: &str) -> Option<&Activity> {
        self.open
            .iter()
            .chain(self.completed.iter())
            .find(|activity| activity.id == id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Activity> {
        self.open.iter().chain(self.completed.iter())
    }
}
