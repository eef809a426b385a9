//! Builds today's activity list from the owned, group and shared channels.
//!
//! Every channel is queried independently. A failing query degrades to an
//! empty result for that channel and is reported as a [`ChannelFailure`];
//! the rest of the agenda still renders.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::agenda::activity::Activity;
use crate::agenda::clock::{days_until, MinuteOfDay};
use crate::requirements::sync::uncheck_requirements;
use crate::store::{AgendaSource, AppointmentStore, Channel, Scope, SharedKind, TaskStore};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Which lookup a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchSource {
    GroupMembership,
    ShareLinks,
    Tasks,
    Routines,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFailure {
    pub source: FetchSource,
    pub channel: Channel,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub activities: Vec<Activity>,
    pub failures: Vec<ChannelFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub purged: usize,
    pub rolled_forward: usize,
    pub unchecked_requirements: usize,
}

/// Purges the owner's completed tasks from earlier days and carries the
/// incomplete ones forward to `today`.
///
/// Requirement tasks being purged uncheck their requirement first, so the
/// appointment checklist resets with them.
pub async fn cleanup_backlog<S>(store: &S, owner_id: &str, today: NaiveDate) -> Result<CleanupReport>
where
    S: TaskStore + AppointmentStore + ?Sized,
{
    let mut report = CleanupReport::default();

    let stale = store.completed_tasks_before(owner_id, today).await?;
    if !stale.is_empty() {
        let mut by_appointment: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for task in &stale {
            if let Some((appointment_id, index)) = task.requirement_link() {
                by_appointment
                    .entry(appointment_id.to_string())
                    .or_default()
                    .insert(index);
            }
        }

        for (appointment_id, indices) in &by_appointment {
            match uncheck_requirements(store, appointment_id, indices).await {
                Ok(count) => report.unchecked_requirements += count,
                Err(err) => log_warn!(
                    "failed to uncheck requirements of appointment {}: {err:?}",
                    appointment_id
                ),
            }
        }

        let ids: Vec<String> = stale.into_iter().map(|task| task.id).collect();
        report.purged = store.delete_tasks(&ids).await?;
    }

    report.rolled_forward = store.roll_forward_incomplete(owner_id, today).await?;

    if report.purged > 0 || report.rolled_forward > 0 {
        log_info!(
            "backlog cleanup for {}: purged {}, rolled forward {}, unchecked {}",
            owner_id,
            report.purged,
            report.rolled_forward,
            report.unchecked_requirements
        );
    }
    Ok(report)
}

/// Ids coming from link tables are only trusted when they parse as UUIDs.
fn retain_uuids(ids: Vec<String>) -> Vec<String> {
    let (valid, rejected): (Vec<_>, Vec<_>) =
        ids.into_iter().partition(|id| Uuid::parse_str(id).is_ok());
    if !rejected.is_empty() {
        log_warn!("dropping {} malformed ids: {:?}", rejected.len(), rejected);
    }
    valid
}

/// Union keyed by id. A later row replaces an earlier one in place.
fn merge_by_id(rows: impl IntoIterator<Item = Activity>) -> Vec<Activity> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Activity> = Vec::new();
    for row in rows {
        match positions.get(&row.id) {
            Some(&index) => merged[index] = row,
            None => {
                positions.insert(row.id.clone(), merged.len());
                merged.push(row);
            }
        }
    }
    merged
}

/// Fetches and merges today's tasks and routines for `owner_id`.
pub async fn aggregate<S>(
    source: &S,
    owner_id: &str,
    today: NaiveDate,
    now: MinuteOfDay,
) -> Aggregation
where
    S: AgendaSource + ?Sized,
{
    let mut failures = Vec::new();

    let group_ids = match source.group_ids(owner_id).await {
        Ok(ids) => retain_uuids(ids),
        Err(err) => {
            log_error!("group membership lookup failed: {err:?}");
            failures.push(ChannelFailure {
                source: FetchSource::GroupMembership,
                channel: Channel::Group,
                message: err.to_string(),
            });
            Vec::new()
        }
    };

    let shared_tasks = shared_ids_or_empty(source, owner_id, SharedKind::Task, &mut failures).await;
    let shared_routines =
        shared_ids_or_empty(source, owner_id, SharedKind::Routine, &mut failures).await;

    let task_scopes = [
        Scope::Owner(owner_id),
        Scope::Groups(&group_ids),
        Scope::Ids(&shared_tasks),
    ];
    let mut tasks = Vec::new();
    for scope in task_scopes {
        match source.tasks_due(scope, today).await {
            Ok(rows) => tasks.extend(
                rows.into_iter()
                    .map(|row| Activity::from_task(row, scope.channel())),
            ),
            Err(err) => {
                log_error!("{} task query failed: {err:?}", scope.channel().as_str());
                failures.push(ChannelFailure {
                    source: FetchSource::Tasks,
                    channel: scope.channel(),
                    message: err.to_string(),
                });
            }
        }
    }

    let routine_scopes = [
        Scope::Owner(owner_id),
        Scope::Groups(&group_ids),
        Scope::Ids(&shared_routines),
    ];
    let mut routines = Vec::new();
    for scope in routine_scopes {
        match source.active_routines(scope).await {
            Ok(rows) => routines.extend(
                rows.into_iter()
                    .filter(|routine| routine.occurs_on(today))
                    .map(|routine| Activity::from_routine(routine, today, now, scope.channel())),
            ),
            Err(err) => {
                log_error!("{} routine query failed: {err:?}", scope.channel().as_str());
                failures.push(ChannelFailure {
                    source: FetchSource::Routines,
                    channel: scope.channel(),
                    message: err.to_string(),
                });
            }
        }
    }

    let mut activities = merge_by_id(tasks);
    activities.extend(merge_by_id(routines));
    attach_document_expiries(source, &mut activities, today).await;
    log_debug!(
        "aggregated {} activities for {} ({} failed lookups)",
        activities.len(),
        owner_id,
        failures.len()
    );

    Aggregation {
        activities,
        failures,
    }
}

async fn shared_ids_or_empty<S>(
    source: &S,
    owner_id: &str,
    kind: SharedKind,
    failures: &mut Vec<ChannelFailure>,
) -> Vec<String>
where
    S: AgendaSource + ?Sized,
{
    match source.shared_ids(owner_id, kind).await {
        Ok(ids) => retain_uuids(ids),
        Err(err) => {
            log_error!("share link lookup ({}) failed: {err:?}", kind.as_str());
            failures.push(ChannelFailure {
                source: FetchSource::ShareLinks,
                channel: Channel::Shared,
                message: err.to_string(),
            });
            Vec::new()
        }
    }
}

async fn attach_document_expiries<S>(source: &S, activities: &mut [Activity], today: NaiveDate)
where
    S: AgendaSource + ?Sized,
{
    let document_ids: Vec<String> = activities
        .iter()
        .filter_map(|activity| activity.document.as_ref())
        .map(|link| link.document_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if document_ids.is_empty() {
        return;
    }

    let expiries = match source.document_expiries(&document_ids).await {
        Ok(expiries) => expiries,
        Err(err) => {
            log_warn!("document expiry lookup failed: {err:?}");
            return;
        }
    };

    for link in activities
        .iter_mut()
        .filter_map(|activity| activity.document.as_mut())
    {
        link.days_left = expiries
            .get(link.document_id.as_str())
            .map(|expires_on| days_until(*expires_on, today));
    }
}
