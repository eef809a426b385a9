//! Slot search for drag-and-drop rescheduling.
//!
//! The occupied timeline is rebuilt from the current view on every query.
//! A computed slot never overlaps an occupied interval: each search first
//! proves the gap it carves from is free, then clips the slot to that gap.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agenda::activity::Activity;
use crate::agenda::classifier::AgendaView;
use crate::agenda::clock::{MinuteOfDay, MINUTES_PER_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: u16,
    pub end: u16,
    /// Routines: obstacles that are never relocated.
    pub fixed: bool,
}

impl Interval {
    fn contains(&self, minute: u16) -> bool {
        self.start <= minute && minute < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn from_activities<'a>(
        activities: impl IntoIterator<Item = &'a Activity>,
        exclude_id: Option<&str>,
    ) -> Self {
        let mut intervals: Vec<Interval> = activities
            .into_iter()
            .filter(|activity| Some(activity.id.as_str()) != exclude_id)
            .filter_map(|activity| {
                activity.span().map(|(start, end)| Interval {
                    start: start.minutes(),
                    end: end.minutes(),
                    fixed: activity.is_fixed(),
                })
            })
            .collect();
        intervals.sort_by_key(|interval| (interval.start, interval.end));
        Self { intervals }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn covers(&self, minute: u16) -> bool {
        self.intervals.iter().any(|interval| interval.contains(minute))
    }

    /// Latest end at or before `minute`, or midnight.
    fn last_end_until(&self, minute: u16) -> u16 {
        self.intervals
            .iter()
            .map(|interval| interval.end)
            .filter(|end| *end <= minute)
            .max()
            .unwrap_or(0)
    }

    /// Earliest start at or after `minute`, or end of day.
    fn first_start_from(&self, minute: u16) -> u16 {
        self.intervals
            .iter()
            .map(|interval| interval.start)
            .filter(|start| *start >= minute)
            .min()
            .unwrap_or(MINUTES_PER_DAY)
    }

    pub fn overlaps(&self, slot: &Slot) -> bool {
        let (start, end) = (slot.start.minutes(), slot.end.minutes());
        self.intervals
            .iter()
            .any(|interval| interval.start < end && start < interval.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl Slot {
    fn from_minutes(start: u16, end: u16) -> Result<Self, ScheduleError> {
        match (MinuteOfDay::new(start), MinuteOfDay::new(end)) {
            (Some(start), Some(end)) if end > start => Ok(Self { start, end }),
            _ => Err(ScheduleError::NoSpace),
        }
    }

    pub fn duration(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropSide {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropTarget {
    Card { id: String, side: DropSide },
    /// Insertion index into the open card list: the drop lands between
    /// `open[index - 1]` and `open[index]`.
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("activity {0} not found in today's agenda")]
    NotFound(String),
    #[error("activity {0} cannot be moved")]
    NotMovable(String),
    #[error("cannot drop an activity onto itself")]
    OntoItself,
    #[error("no space")]
    NoSpace,
    #[error("no drag in progress")]
    NoActiveDrag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum DropPreview {
    Slot { slot: Slot, hint: String },
    NoSpace { hint: String },
}

impl DropPreview {
    pub fn hint(&self) -> &str {
        match self {
            DropPreview::Slot { hint, .. } | DropPreview::NoSpace { hint } => hint,
        }
    }
}

/// Finds the slot a dragged activity would take if dropped on `target`.
pub fn compute_slot(
    view: &AgendaView,
    dragged_id: &str,
    target: &DropTarget,
) -> Result<Slot, ScheduleError> {
    let dragged = view
        .find(dragged_id)
        .ok_or_else(|| ScheduleError::NotFound(dragged_id.to_string()))?;
    if !dragged.is_movable() {
        return Err(ScheduleError::NotMovable(dragged_id.to_string()));
    }

    // Completed items are folded away and never obstruct a drop.
    let occupied = IntervalSet::from_activities(view.open.iter(), Some(dragged_id));
    let duration = dragged.default_duration();

    match target {
        DropTarget::Card { id, side } => {
            if id == dragged_id {
                return Err(ScheduleError::OntoItself);
            }
            let target_activity = view
                .find(id)
                .ok_or_else(|| ScheduleError::NotFound(id.clone()))?;

            let span = target_activity
                .span()
                .filter(|_| !target_activity.completed);
            match span {
                Some((start, end)) => match side {
                    DropSide::Before => slot_before(&occupied, start.minutes(), duration),
                    DropSide::After => slot_after(&occupied, end.minutes(), duration),
                },
                None => {
                    // No usable interval on the card: fall back to its position.
                    // The folded completed section sits after every open card.
                    let position = match view.open.iter().position(|activity| activity.id == *id) {
                        Some(index) if *side == DropSide::Before => index,
                        Some(index) => index + 1,
                        None => view.open.len(),
                    };
                    slot_at_position(&view.open, &occupied, dragged_id, position, duration)
                }
            }
        }
        DropTarget::Position(position) => {
            slot_at_position(&view.open, &occupied, dragged_id, *position, duration)
        }
    }
}

/// Slot ending at `hi`, reaching back at most `duration` minutes.
fn slot_before(occupied: &IntervalSet, hi: u16, duration: u16) -> Result<Slot, ScheduleError> {
    if hi == 0 || occupied.covers(hi - 1) {
        return Err(ScheduleError::NoSpace);
    }
    let lo = occupied.last_end_until(hi);
    let length = duration.min(hi - lo);
    Slot::from_minutes(hi - length, hi)
}

/// Slot starting at `lo`, reaching forward at most `duration` minutes.
fn slot_after(occupied: &IntervalSet, lo: u16, duration: u16) -> Result<Slot, ScheduleError> {
    if lo >= MINUTES_PER_DAY || occupied.covers(lo) {
        return Err(ScheduleError::NoSpace);
    }
    let hi = occupied.first_start_from(lo);
    let length = duration.min(hi - lo);
    Slot::from_minutes(lo, lo + length)
}

/// Slot inferred from the timed neighbours around an insertion point in
/// render order.
fn slot_at_position(
    order: &[Activity],
    occupied: &IntervalSet,
    dragged_id: &str,
    position: usize,
    duration: u16,
) -> Result<Slot, ScheduleError> {
    let position = position.min(order.len());
    let timed = |activity: &&Activity| activity.id != dragged_id && activity.span().is_some();

    let gap_start = order[..position]
        .iter()
        .rev()
        .find(timed)
        .and_then(Activity::span)
        .map_or(0, |(_, end)| end.minutes());
    let gap_end = order[position..]
        .iter()
        .find(timed)
        .and_then(Activity::span)
        .map_or(MINUTES_PER_DAY, |(start, _)| start.minutes());

    if gap_end <= gap_start || occupied.covers(gap_start) {
        return Err(ScheduleError::NoSpace);
    }
    let free_end = occupied.first_start_from(gap_start).min(gap_end);
    let length = duration.min(free_end - gap_start);
    Slot::from_minutes(gap_start, gap_start + length)
}

/// What a drag-over should show for `target`.
pub fn preview(
    view: &AgendaView,
    dragged_id: &str,
    target: &DropTarget,
) -> Result<DropPreview, ScheduleError> {
    match compute_slot(view, dragged_id, target) {
        Ok(slot) => Ok(DropPreview::Slot {
            slot,
            hint: slot.to_string(),
        }),
        Err(ScheduleError::NoSpace) => Ok(DropPreview::NoSpace {
            hint: "No space".to_string(),
        }),
        Err(err) => Err(err),
    }
}

/// Completes a manually edited range. Returns `None` when both ends are
/// absent. A computed end past midnight wraps into the next day's minutes;
/// exactly midnight is kept as `24:00`.
pub fn normalize_range(
    start: Option<MinuteOfDay>,
    end: Option<MinuteOfDay>,
    duration: u16,
) -> Option<(MinuteOfDay, MinuteOfDay)> {
    let push_end = |start: MinuteOfDay| {
        MinuteOfDay::new(start.minutes() + duration)
            .unwrap_or_else(|| start.add_wrapping(i32::from(duration)))
    };

    match (start, end) {
        (None, None) => None,
        (Some(start), None) => Some((start, push_end(start))),
        (None, Some(end)) => Some((end.add_wrapping(-i32::from(duration)), end)),
        (Some(start), Some(end)) if end <= start => Some((start, push_end(start))),
        (Some(start), Some(end)) => Some((start, end)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::activity::ActivityKind;
    use crate::store::Channel;
    use chrono::NaiveDate;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn at(value: &str) -> MinuteOfDay {
        MinuteOfDay::parse(value).unwrap()
    }

    fn item(id: &str, span: Option<(&str, &str)>, kind: ActivityKind) -> Activity {
        Activity {
            id: id.into(),
            description: id.into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            start: span.map(|(s, _)| at(s)),
            end: span.map(|(_, e)| at(e)),
            completed: false,
            owner_id: "ana".into(),
            group_id: None,
            priority: None,
            kind,
            document: None,
            channel: Channel::Owned,
        }
    }

    fn task(id: &str, span: Option<(&str, &str)>) -> Activity {
        item(id, span, ActivityKind::Task)
    }

    fn card(id: &str, side: DropSide) -> DropTarget {
        DropTarget::Card {
            id: id.into(),
            side,
        }
    }

    fn slot(start: &str, end: &str) -> Slot {
        Slot {
            start: at(start),
            end: at(end),
        }
    }

    #[test]
    fn before_routine_uses_full_default() {
        let view = AgendaView::build(
            vec![
                item("gym", Some(("09:00", "09:30")), ActivityKind::Routine),
                task("new", None),
            ],
            at("06:00"),
        );
        let result = compute_slot(&view, "new", &card("gym", DropSide::Before));
        assert_eq!(result, Ok(slot("08:30", "09:00")));
    }

    #[test]
    fn narrow_gap_is_used_whole() {
        let view = AgendaView::build(
            vec![
                task("a", Some(("10:00", "10:30"))),
                task("b", Some(("10:45", "11:15"))),
                task("c", None),
            ],
            at("06:00"),
        );
        let after_a = compute_slot(&view, "c", &card("a", DropSide::After));
        assert_eq!(after_a, Ok(slot("10:30", "10:45")));
        let before_b = compute_slot(&view, "c", &card("b", DropSide::Before));
        assert_eq!(before_b, Ok(slot("10:30", "10:45")));
    }

    #[test]
    fn kind_sets_the_default_duration() {
        let requirement = ActivityKind::RequirementTask {
            appointment_id: "appt".into(),
            requirement_index: 0,
        };
        let view = AgendaView::build(
            vec![task("a", Some(("10:00", "10:30"))), item("req", None, requirement)],
            at("06:00"),
        );
        let result = compute_slot(&view, "req", &card("a", DropSide::After));
        assert_eq!(result, Ok(slot("10:30", "10:45")));
    }

    #[test]
    fn adjacent_intervals_leave_no_space() {
        let view = AgendaView::build(
            vec![
                task("a", Some(("10:00", "10:30"))),
                task("b", Some(("10:30", "11:00"))),
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("a", DropSide::After)),
            Err(ScheduleError::NoSpace)
        );
        let preview = preview(&view, "c", &card("b", DropSide::Before)).unwrap();
        assert_eq!(preview.hint(), "No space");
    }

    #[test]
    fn overlapping_neighbour_blocks_the_side() {
        // "long" covers the minute right before "b" starts.
        let view = AgendaView::build(
            vec![
                task("long", Some(("09:00", "12:00"))),
                task("b", Some(("11:00", "11:30"))),
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("b", DropSide::Before)),
            Err(ScheduleError::NoSpace)
        );
        assert_eq!(
            compute_slot(&view, "c", &card("long", DropSide::After)),
            Ok(slot("12:00", "12:30"))
        );
    }

    #[test]
    fn day_edges_bound_the_slot() {
        let view = AgendaView::build(
            vec![
                task("early", Some(("00:10", "00:20"))),
                task("late", Some(("23:50", "24:00"))),
                task("c", None),
            ],
            at("00:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("early", DropSide::Before)),
            Ok(slot("00:00", "00:10"))
        );
        assert_eq!(
            compute_slot(&view, "c", &card("late", DropSide::After)),
            Err(ScheduleError::NoSpace)
        );
    }

    #[test]
    fn rejects_invalid_drags() {
        let mut done = task("done", Some(("08:00", "08:30")));
        done.completed = true;
        let view = AgendaView::build(
            vec![
                done,
                item("gym", Some(("09:00", "09:30")), ActivityKind::Routine),
                task("a", Some(("10:00", "10:30"))),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "gym", &card("a", DropSide::Before)),
            Err(ScheduleError::NotMovable("gym".into()))
        );
        assert_eq!(
            compute_slot(&view, "done", &card("a", DropSide::Before)),
            Err(ScheduleError::NotMovable("done".into()))
        );
        assert_eq!(
            compute_slot(&view, "a", &card("a", DropSide::Before)),
            Err(ScheduleError::OntoItself)
        );
        assert_eq!(
            compute_slot(&view, "a", &card("ghost", DropSide::Before)),
            Err(ScheduleError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn completed_items_do_not_obstruct() {
        let mut done = task("done", Some(("09:30", "10:00")));
        done.completed = true;
        let view = AgendaView::build(
            vec![
                task("a", Some(("09:00", "09:30"))),
                done,
                task("b", Some(("10:00", "10:30"))),
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("a", DropSide::After)),
            Ok(slot("09:30", "10:00"))
        );
        assert_eq!(
            compute_slot(&view, "c", &card("b", DropSide::Before)),
            Ok(slot("09:30", "10:00"))
        );
    }

    #[test]
    fn completed_target_lands_after_the_open_list() {
        let mut done = task("done", Some(("08:00", "08:30")));
        done.completed = true;
        let mut unscheduled = task("filed", None);
        unscheduled.completed = true;
        let view = AgendaView::build(
            vec![
                task("a", Some(("10:00", "10:30"))),
                done,
                unscheduled,
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("filed", DropSide::Before)),
            Ok(slot("10:30", "11:00"))
        );
        assert_eq!(
            compute_slot(&view, "c", &card("done", DropSide::After)),
            Ok(slot("10:30", "11:00"))
        );
        let hint = preview(&view, "c", &card("filed", DropSide::After)).unwrap();
        assert_eq!(hint.hint(), "10:30–11:00");
    }

    #[test]
    fn positional_drop_uses_render_neighbours() {
        // Render order: upcoming 10:00, upcoming 13:00, untimed "c".
        let view = AgendaView::build(
            vec![
                task("a", Some(("10:00", "10:30"))),
                task("b", Some(("13:00", "14:00"))),
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &DropTarget::Position(1)),
            Ok(slot("10:30", "11:00"))
        );
        assert_eq!(
            compute_slot(&view, "c", &DropTarget::Position(0)),
            Ok(slot("00:00", "00:30"))
        );
        assert_eq!(
            compute_slot(&view, "c", &DropTarget::Position(99)),
            Ok(slot("14:00", "14:30"))
        );
    }

    #[test]
    fn untimed_target_falls_back_to_its_position() {
        let view = AgendaView::build(
            vec![
                task("a", Some(("10:00", "10:30"))),
                task("notes", None),
                task("c", None),
            ],
            at("06:00"),
        );
        assert_eq!(
            compute_slot(&view, "c", &card("notes", DropSide::Before)),
            Ok(slot("10:30", "11:00"))
        );
    }

    #[test]
    fn slots_never_overlap_occupied_intervals() {
        let mut rng = StdRng::seed_from_u64(7);
        for round in 0..300 {
            let mut activities = Vec::new();
            let mut cursor: u16 = rng.gen_range(0..120);
            let mut index = 0;
            while cursor < MINUTES_PER_DAY - 10 && index < 12 {
                let length = rng.gen_range(5..90).min(MINUTES_PER_DAY - cursor);
                let start = MinuteOfDay::new(cursor).unwrap();
                let end = MinuteOfDay::new(cursor + length).unwrap();
                let kind = if rng.gen_bool(0.3) {
                    ActivityKind::Routine
                } else {
                    ActivityKind::Task
                };
                let mut activity = item(&format!("i{index}"), None, kind);
                activity.start = Some(start);
                activity.end = Some(end);
                activities.push(activity);
                cursor += length + rng.gen_range(0..60);
                index += 1;
            }
            // A few overlapping movable items as well.
            if rng.gen_bool(0.5) && !activities.is_empty() {
                let base = activities[rng.gen_range(0..activities.len())].clone();
                let mut overlap = base;
                overlap.id = "overlap".into();
                overlap.kind = ActivityKind::Task;
                activities.push(overlap);
            }
            activities.push(task("dragged", None));

            let view = AgendaView::build(activities, MinuteOfDay::new(rng.gen_range(0..1440)).unwrap());
            let occupied = IntervalSet::from_activities(view.open.iter(), Some("dragged"));
            let targets: Vec<DropTarget> = view
                .all()
                .filter(|a| a.id != "dragged")
                .flat_map(|a| [card(&a.id, DropSide::Before), card(&a.id, DropSide::After)])
                .chain((0..=view.open.len()).map(DropTarget::Position))
                .collect();

            for target in targets {
                match compute_slot(&view, "dragged", &target) {
                    Ok(slot) => {
                        assert!(slot.duration() > 0, "round {round}: empty slot");
                        assert!(slot.duration() <= 30, "round {round}: slot too long");
                        assert!(
                            !occupied.overlaps(&slot),
                            "round {round}: {slot} overlaps for {target:?}"
                        );
                    }
                    Err(ScheduleError::NoSpace) => {}
                    Err(other) => panic!("round {round}: unexpected {other}"),
                }
            }
        }
    }

    #[test]
    fn normalize_fills_missing_ends() {
        assert_eq!(normalize_range(None, None, 30), None);
        assert_eq!(
            normalize_range(Some(at("10:00")), None, 30),
            Some((at("10:00"), at("10:30")))
        );
        assert_eq!(
            normalize_range(None, Some(at("00:10")), 30),
            Some((at("23:40"), at("00:10")))
        );
        assert_eq!(
            normalize_range(Some(at("10:00")), Some(at("09:00")), 15),
            Some((at("10:00"), at("10:15")))
        );
        assert_eq!(
            normalize_range(Some(at("23:30")), Some(at("23:30")), 30),
            Some((at("23:30"), at("24:00")))
        );
        assert_eq!(
            normalize_range(Some(at("23:50")), None, 30),
            Some((at("23:50"), at("00:20")))
        );
        assert_eq!(
            normalize_range(Some(at("08:00")), Some(at("09:00")), 30),
            Some((at("08:00"), at("09:00")))
        );
    }
}
