//! Daily planning of improvement backlog items into tasks.
//!
//! Items are scored by priority and idle time, then picked greedily while
//! they fit the minute budget, the allowed block sizes and the optional
//! category quotas. Planning is idempotent per day: the task upsert is
//! keyed by `(improvement_id, due_date, owner_id)` and the planner skips a
//! day that already holds improvement tasks.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::Serialize;

use crate::db::models::{Improvement, ImprovementTaskUpsert};
use crate::improvements::config::PlannerConfig;
use crate::store::{ImprovementStore, TaskStore};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const NEVER_DONE_IDLE_DAYS: i64 = 999;
const DONE_TODAY_PENALTY: f64 = 5.0;
const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanReason {
    Planned,
    AlreadyPlanned,
    NoBacklog,
    CooldownAll,
    NoFit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub reason: PlanReason,
    /// Improvement ids that received a task today.
    pub planned: Vec<String>,
}

impl PlanOutcome {
    fn skipped(reason: PlanReason) -> Self {
        Self {
            reason,
            planned: Vec::new(),
        }
    }
}

pub fn is_off_cooldown(item: &Improvement, today: NaiveDate) -> bool {
    match (item.cooldown_days, item.last_done_at) {
        (Some(days), Some(last_done)) if days > 0 => last_done + Duration::days(days) <= today,
        _ => true,
    }
}

pub fn score(item: &Improvement, today: NaiveDate, config: &PlannerConfig, jitter: f64) -> f64 {
    let priority = item.priority.unwrap_or(config.default_priority);
    let idle_days = item
        .last_done_at
        .map_or(NEVER_DONE_IDLE_DAYS, |last| (today - last).num_days().max(0));
    let penalty = if idle_days == 0 { DONE_TODAY_PENALTY } else { 0.0 };

    (priority * 10 + idle_days) as f64 - penalty + jitter
}

fn effort(item: &Improvement, config: &PlannerConfig) -> u32 {
    item.effort_minutes.unwrap_or(config.default_effort_minutes)
}

fn category(item: &Improvement) -> &str {
    item.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
}

/// Picks today's items from an already cooldown-filtered, score-sorted list.
pub fn select(candidates: &[Improvement], config: &PlannerConfig) -> Vec<Improvement> {
    let targets = config.category_targets();
    let target_for = |category: &str| {
        targets
            .get(category)
            .copied()
            .unwrap_or(config.budget_minutes)
    };

    let mut used_by_category: BTreeMap<String, u32> = BTreeMap::new();
    let mut remaining = config.budget_minutes;
    let mut chosen: Vec<usize> = Vec::new();

    for (index, item) in candidates.iter().enumerate() {
        if chosen.len() >= config.max_tasks || remaining == 0 {
            break;
        }
        let block = effort(item, config);
        if !config.allowed_blocks.contains(&block) || block > remaining {
            continue;
        }

        if !targets.is_empty() {
            let item_category = category(item);
            let used = used_by_category.get(item_category).copied().unwrap_or(0);
            if used + block > target_for(item_category) {
                let other_fits = candidates.iter().enumerate().any(|(other_index, other)| {
                    if other_index == index || chosen.contains(&other_index) {
                        return false;
                    }
                    let other_block = effort(other, config);
                    let other_category = category(other);
                    let other_used = used_by_category.get(other_category).copied().unwrap_or(0);
                    config.allowed_blocks.contains(&other_block)
                        && other_block <= remaining
                        && other_used + other_block <= target_for(other_category)
                });
                if other_fits {
                    continue;
                }
            }
            used_by_category.insert(item_category.to_string(), used + block);
        }

        chosen.push(index);
        remaining -= block;
    }

    chosen.into_iter().map(|index| candidates[index].clone()).collect()
}

/// Plans today's improvement tasks for `owner_id`.
pub async fn plan_improvements<S, R>(
    store: &S,
    owner_id: &str,
    today: NaiveDate,
    config: &PlannerConfig,
    rng: &mut R,
) -> Result<PlanOutcome>
where
    S: TaskStore + ImprovementStore + ?Sized,
    R: Rng + Send,
{
    if store.has_improvement_tasks(owner_id, today).await? {
        return Ok(PlanOutcome::skipped(PlanReason::AlreadyPlanned));
    }

    let backlog = store.active_improvements(owner_id).await?;
    if backlog.is_empty() {
        return Ok(PlanOutcome::skipped(PlanReason::NoBacklog));
    }

    let mut scored: Vec<(f64, Improvement)> = backlog
        .into_iter()
        .filter(|item| is_off_cooldown(item, today))
        .map(|item| {
            let jitter = rng.gen::<f64>();
            (score(&item, today, config, jitter), item)
        })
        .collect();
    if scored.is_empty() {
        return Ok(PlanOutcome::skipped(PlanReason::CooldownAll));
    }
    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    let candidates: Vec<Improvement> = scored.into_iter().map(|(_, item)| item).collect();

    let chosen = select(&candidates, config);
    if chosen.is_empty() {
        return Ok(PlanOutcome::skipped(PlanReason::NoFit));
    }

    let rows: Vec<ImprovementTaskUpsert> = chosen
        .iter()
        .map(|item| ImprovementTaskUpsert {
            owner_id: owner_id.to_string(),
            improvement_id: item.id.clone(),
            description: format!("[Improvement] {}", item.title),
            due_date: today,
            priority: item.priority.unwrap_or(config.default_task_priority),
        })
        .collect();
    store
        .upsert_improvement_tasks(&rows)
        .await
        .context("failed to upsert improvement tasks")?;

    let planned: Vec<String> = chosen.into_iter().map(|item| item.id).collect();
    if let Err(err) = store.mark_improvements_planned(&planned, owner_id, today).await {
        log_warn!("could not record last_planned_at: {err:?}");
    }

    log_info!("planned {} improvement tasks for {}", planned.len(), owner_id);
    Ok(PlanOutcome {
        reason: PlanReason::Planned,
        planned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::{AgendaSource, Scope};
    use rand::{rngs::StdRng, SeedableRng};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn item(id: &str, priority: i64, effort: u32, category: &str) -> Improvement {
        Improvement {
            id: id.into(),
            owner_id: "ana".into(),
            title: format!("Fix {id}"),
            priority: Some(priority),
            effort_minutes: Some(effort),
            category: Some(category.into()),
            cooldown_days: None,
            last_done_at: None,
            last_planned_at: None,
            is_active: true,
        }
    }

    #[test]
    fn cooldown_window() {
        let mut shelf = item("shelf", 3, 25, "Home");
        shelf.cooldown_days = Some(7);
        shelf.last_done_at = Some(day(12));
        assert!(is_off_cooldown(&shelf, day(19)));
        assert!(!is_off_cooldown(&shelf, day(18)));

        shelf.cooldown_days = Some(0);
        assert!(is_off_cooldown(&shelf, day(13)));
    }

    #[test]
    fn scoring_prefers_priority_then_idle_time() {
        let config = PlannerConfig::default();
        let never = item("never", 1, 25, "Home");
        let mut today = item("today", 3, 25, "Home");
        today.last_done_at = Some(day(19));
        let mut week = item("week", 3, 25, "Home");
        week.last_done_at = Some(day(12));

        assert_eq!(score(&never, day(19), &config, 0.0), 1009.0);
        assert_eq!(score(&today, day(19), &config, 0.0), 25.0);
        assert_eq!(score(&week, day(19), &config, 0.5), 37.5);
    }

    #[test]
    fn selection_respects_budget_blocks_and_count() {
        let config = PlannerConfig::default();
        let candidates = vec![
            item("a", 5, 25, "Home"),
            item("big", 5, 45, "Home"),
            item("b", 4, 25, "Home"),
            item("c", 3, 15, "Home"),
            item("d", 2, 15, "Home"),
        ];
        let chosen: Vec<String> = select(&candidates, &config).into_iter().map(|i| i.id).collect();
        // 25 + 25 leaves 10 minutes: no 15-minute block fits after that.
        assert_eq!(chosen, vec!["a", "b"]);

        let config = PlannerConfig {
            max_tasks: 1,
            ..PlannerConfig::default()
        };
        assert_eq!(select(&candidates, &config).len(), 1);
    }

    #[test]
    fn quota_skips_item_only_when_another_fits() {
        let mut config = PlannerConfig::default();
        config.category_quotas.insert("Code".into(), 50);
        config.category_quotas.insert("Home".into(), 50);
        // Targets: 30 minutes each.

        let candidates = vec![
            item("code-1", 5, 25, "Code"),
            item("code-2", 5, 25, "Code"),
            item("home-1", 1, 25, "Home"),
        ];
        let chosen: Vec<String> = select(&candidates, &config).into_iter().map(|i| i.id).collect();
        assert_eq!(chosen, vec!["code-1", "home-1"]);

        let only_code = vec![item("code-1", 5, 25, "Code"), item("code-2", 5, 25, "Code")];
        let chosen: Vec<String> = select(&only_code, &config).into_iter().map(|i| i.id).collect();
        assert_eq!(chosen, vec!["code-1", "code-2"]);
    }

    #[tokio::test]
    async fn plans_once_per_day() {
        let db = Database::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let config = PlannerConfig::default();

        let outcome = plan_improvements(&db, "ana", day(19), &config, &mut rng).await.unwrap();
        assert_eq!(outcome.reason, PlanReason::NoBacklog);

        db.insert_improvement(&item("desk", 4, 25, "Home")).await.unwrap();
        db.insert_improvement(&item("inbox", 2, 15, "Code")).await.unwrap();

        let outcome = plan_improvements(&db, "ana", day(19), &config, &mut rng).await.unwrap();
        assert_eq!(outcome.reason, PlanReason::Planned);
        assert_eq!(outcome.planned, vec!["desk", "inbox"]);

        let tasks = db.tasks_due(Scope::Owner("ana"), day(19)).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().any(|t| t.description.as_deref() == Some("[Improvement] Fix desk")));
        assert!(tasks.iter().all(|t| t.improvement_id.is_some()));

        let backlog = db.active_improvements("ana").await.unwrap();
        assert!(backlog.iter().all(|i| i.last_planned_at == Some(day(19))));

        let again = plan_improvements(&db, "ana", day(19), &config, &mut rng).await.unwrap();
        assert_eq!(again.reason, PlanReason::AlreadyPlanned);
    }

    #[tokio::test]
    async fn reports_cooldown_and_no_fit() {
        let db = Database::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let config = PlannerConfig::default();

        let mut resting = item("resting", 3, 25, "Home");
        resting.cooldown_days = Some(3);
        resting.last_done_at = Some(day(18));
        db.insert_improvement(&resting).await.unwrap();
        let outcome = plan_improvements(&db, "ana", day(19), &config, &mut rng).await.unwrap();
        assert_eq!(outcome.reason, PlanReason::CooldownAll);

        db.insert_improvement(&item("huge", 3, 90, "Home")).await.unwrap();
        let outcome = plan_improvements(&db, "ana", day(19), &config, &mut rng).await.unwrap();
        assert_eq!(outcome.reason, PlanReason::NoFit);
    }
}
