//! One controller per agenda view: owns the current view, the refresh loop
//! and the single drag session.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::agenda::activity::{Activity, ActivityKind};
use crate::agenda::aggregator::{aggregate, cleanup_backlog, ChannelFailure, CleanupReport};
use crate::agenda::classifier::{AgendaCard, AgendaView, BucketCounts};
use crate::agenda::clock::{Clock, MinuteOfDay};
use crate::agenda::scheduler::{compute_slot, normalize_range, preview, DropPreview, DropTarget, ScheduleError, Slot};
use crate::db::models::{Requirement, RoutinePatch, TaskPatch, TaskRecord};
use crate::improvements::{plan_improvements, PlanOutcome};
use crate::requirements::sync::{
    edit_requirements, handle_task_deleted, set_requirement_checked, toggle_task_completion,
    MirrorOutcome, RequirementEdit, TaskToggle,
};
use crate::settings::AgendaSettings;
use crate::store::{AgendaBackend, Channel, RoutineStore, TaskStore};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaSnapshot {
    pub owner_id: String,
    pub date: NaiveDate,
    pub now: MinuteOfDay,
    pub refreshed_at: NaiveDateTime,
    pub cards: Vec<AgendaCard>,
    pub completed_cards: Vec<AgendaCard>,
    pub counts: BucketCounts,
    pub failures: Vec<ChannelFailure>,
    pub cleanup: Option<CleanupReport>,
    pub plan: Option<PlanOutcome>,
}

/// Field edits for a task or routine. Times are completed with the kind's
/// default duration when only one end is given or the range is inverted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEdit {
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub start: Option<MinuteOfDay>,
    pub end: Option<MinuteOfDay>,
}

impl ActivityEdit {
    fn touches_times(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    fn range(
        &self,
        current: (Option<MinuteOfDay>, Option<MinuteOfDay>),
        duration: u16,
    ) -> Option<(MinuteOfDay, MinuteOfDay)> {
        normalize_range(self.start.or(current.0), self.end.or(current.1), duration)
    }
}

#[derive(Default)]
struct RefreshLoop {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
struct DragSession {
    activity_id: String,
    last_preview: Option<DropPreview>,
}

#[derive(Clone)]
pub struct AgendaController {
    backend: Arc<dyn AgendaBackend>,
    clock: Arc<dyn Clock>,
    owner_id: String,
    settings: AgendaSettings,
    view: Arc<Mutex<AgendaView>>,
    snapshot: Arc<Mutex<Option<AgendaSnapshot>>>,
    drag: Arc<Mutex<Option<DragSession>>>,
    refresh_loop: Arc<Mutex<RefreshLoop>>,
    changed: Arc<Notify>,
    refresh_interval: Duration,
}

impl AgendaController {
    pub fn new(
        backend: Arc<dyn AgendaBackend>,
        clock: Arc<dyn Clock>,
        owner_id: impl Into<String>,
        settings: AgendaSettings,
    ) -> Self {
        let refresh_interval = settings.refresh_interval();
        Self {
            backend,
            clock,
            owner_id: owner_id.into(),
            settings,
            view: Arc::new(Mutex::new(AgendaView::default())),
            snapshot: Arc::new(Mutex::new(None)),
            drag: Arc::new(Mutex::new(None)),
            refresh_loop: Arc::new(Mutex::new(RefreshLoop::default())),
            changed: Arc::new(Notify::new()),
            refresh_interval,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Full re-fetch: plan improvements, clean up the backlog, aggregate and
    /// classify. Safe to run concurrently; the last one to finish wins.
    pub async fn refresh(&self) -> AgendaSnapshot {
        let today = self.clock.today();
        let backend = self.backend.as_ref();

        let plan = if self.settings.plan_improvements {
            let mut rng = StdRng::from_entropy();
            match plan_improvements(backend, &self.owner_id, today, &self.settings.planner, &mut rng)
                .await
            {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    log_warn!("improvement planning failed: {err:?}");
                    None
                }
            }
        } else {
            None
        };

        let cleanup = match cleanup_backlog(backend, &self.owner_id, today).await {
            Ok(report) => Some(report),
            Err(err) => {
                log_warn!("backlog cleanup failed: {err:?}");
                None
            }
        };

        let now = self.clock.minute_of_day();
        let aggregation = aggregate(backend, &self.owner_id, today, now).await;
        let view = AgendaView::build(aggregation.activities, now);

        let snapshot = AgendaSnapshot {
            owner_id: self.owner_id.clone(),
            date: today,
            now,
            refreshed_at: self.clock.now(),
            cards: view.cards.clone(),
            completed_cards: view.completed_cards.clone(),
            counts: view.counts,
            failures: aggregation.failures,
            cleanup,
            plan,
        };

        *self.view.lock().await = view;
        *self.snapshot.lock().await = Some(snapshot.clone());
        snapshot
    }

    pub async fn snapshot(&self) -> Option<AgendaSnapshot> {
        self.snapshot.lock().await.clone()
    }

    /// Latest snapshot, refreshing first when none exists yet.
    pub async fn current(&self) -> AgendaSnapshot {
        match self.snapshot().await {
            Some(snapshot) => snapshot,
            None => self.refresh().await,
        }
    }

    pub async fn activity(&self, id: &str) -> Option<Activity> {
        self.view.lock().await.find(id).cloned()
    }

    /// Starts the periodic refresh loop. Calling it twice is a no-op.
    pub async fn attach(&self) {
        let mut guard = self.refresh_loop.lock().await;
        if guard.handle.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(refresh_loop(self.clone(), cancel_token.clone()));
        guard.handle = Some(handle);
        guard.cancel_token = Some(cancel_token);
        log_info!(
            "agenda attached for {} (refresh every {:?})",
            self.owner_id,
            self.refresh_interval
        );
    }

    pub async fn detach(&self) -> Result<()> {
        let (token, handle) = {
            let mut guard = self.refresh_loop.lock().await;
            (guard.cancel_token.take(), guard.handle.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        self.drag_end().await;

        match handle {
            Some(handle) => handle
                .await
                .context("agenda refresh loop failed to join"),
            None => Ok(()),
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.refresh_loop.lock().await.handle.is_some()
    }

    /// Realtime path: something changed in the store, refresh soon.
    pub fn notify_changed(&self) {
        self.changed.notify_one();
    }

    pub async fn drag_start(&self, id: &str) -> Result<(), ScheduleError> {
        let activity = self
            .activity(id)
            .await
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        if !activity.is_movable() {
            return Err(ScheduleError::NotMovable(id.to_string()));
        }

        let mut drag = self.drag.lock().await;
        if let Some(previous) = drag.as_ref() {
            log_warn!("drag of {} replaced by {}", previous.activity_id, id);
        }
        *drag = Some(DragSession {
            activity_id: id.to_string(),
            last_preview: None,
        });
        Ok(())
    }

    pub async fn drag_over(&self, target: &DropTarget) -> Result<DropPreview, ScheduleError> {
        let mut drag = self.drag.lock().await;
        let session = drag.as_mut().ok_or(ScheduleError::NoActiveDrag)?;
        let view = self.view.lock().await;
        let result = preview(&view, &session.activity_id, target)?;
        session.last_preview = Some(result.clone());
        Ok(result)
    }

    /// Hint shown by the last drag-over, if any.
    pub async fn drag_hint(&self) -> Option<String> {
        self.drag
            .lock()
            .await
            .as_ref()
            .and_then(|session| session.last_preview.as_ref())
            .map(|preview| preview.hint().to_string())
    }

    /// Persists the slot for the dragged activity, then refreshes. A
    /// rejected drop leaves the store untouched and the drag active.
    pub async fn drop_at(&self, target: &DropTarget) -> Result<Slot> {
        let activity_id = self
            .drag
            .lock()
            .await
            .as_ref()
            .map(|session| session.activity_id.clone())
            .ok_or(ScheduleError::NoActiveDrag)?;

        let slot = {
            let view = self.view.lock().await;
            compute_slot(&view, &activity_id, target)
        };
        let slot = match slot {
            Ok(slot) => slot,
            Err(err) => {
                log_warn!("drop of {} rejected: {}", activity_id, err);
                return Err(err.into());
            }
        };

        self.backend
            .update_task_times(&activity_id, slot.start, slot.end)
            .await
            .with_context(|| format!("failed to store new slot for {activity_id}"))?;
        log_info!("moved {} to {}", activity_id, slot);

        self.drag_end().await;
        self.refresh().await;
        Ok(slot)
    }

    pub async fn drag_end(&self) {
        self.drag.lock().await.take();
    }

    pub async fn toggle(&self, id: &str) -> Result<TaskToggle> {
        if let Some(activity) = self.activity(id).await {
            if activity.is_fixed() {
                bail!("routines cannot be checked off");
            }
        }
        let toggle = toggle_task_completion(self.backend.as_ref(), id).await?;
        if let Some(mirror) = &toggle.mirror {
            if !mirror.is_consistent() {
                log_error!("requirement mirror diverged for task {}: {:?}", id, mirror.errors);
            }
        }
        self.refresh().await;
        Ok(toggle)
    }

    pub async fn edit(&self, id: &str, edit: &ActivityEdit) -> Result<()> {
        if let Some(task) = self.backend.get_task(id).await? {
            self.edit_task(task, edit).await?;
        } else if let Some(routine) = self.backend.get_routine(id).await? {
            if edit.date.is_some() {
                bail!("routines recur by weekday; edit their days instead of a date");
            }
            let mut patch = RoutinePatch {
                description: edit.description.clone(),
                ..RoutinePatch::default()
            };
            if edit.touches_times() {
                let duration = ActivityKind::Routine.default_duration();
                if let Some((start, end)) =
                    edit.range((routine.start_time, routine.end_time), duration)
                {
                    patch.start_time = Some(Some(start));
                    patch.end_time = Some(Some(end));
                }
            }
            self.backend.update_routine(id, &patch).await?;
        } else {
            bail!("no task or routine with id {id}");
        }

        self.refresh().await;
        Ok(())
    }

    async fn edit_task(&self, task: TaskRecord, edit: &ActivityEdit) -> Result<()> {
        let current = (task.start_time, task.end_time);
        let duration = Activity::from_task(task.clone(), Channel::Owned).default_duration();

        let mut patch = TaskPatch {
            description: edit.description.clone(),
            due_date: edit.date,
            ..TaskPatch::default()
        };
        if edit.touches_times() {
            if let Some((start, end)) = edit.range(current, duration) {
                patch.start_time = Some(Some(start));
                patch.end_time = Some(Some(end));
            }
        }
        self.backend.update_task(&task.id, &patch).await
    }

    pub async fn delete(&self, id: &str, routine: bool) -> Result<()> {
        if routine {
            self.backend.delete_routine(id).await?;
        } else {
            let task = self
                .backend
                .get_task(id)
                .await?
                .ok_or_else(|| anyhow!("Task {id} not found"))?;
            let activity = Activity::from_task(task, Channel::Owned);
            if !activity.is_deletable() {
                let label = if activity.is_document() { "Document" } else { activity.kind.label() };
                bail!("{label} tasks are managed from their source and cannot be deleted here");
            }
            self.backend.delete_task(id).await?;
        }
        self.refresh().await;
        Ok(())
    }

    /// Realtime delete of a task row made elsewhere.
    pub async fn on_task_deleted(&self, task: &TaskRecord) -> Result<()> {
        if handle_task_deleted(self.backend.as_ref(), task).await? {
            log_info!("requirement of deleted task {} unchecked", task.id);
        }
        self.notify_changed();
        Ok(())
    }

    pub async fn set_requirement(
        &self,
        appointment_id: &str,
        index: usize,
        checked: bool,
    ) -> Result<MirrorOutcome> {
        let outcome = set_requirement_checked(
            self.backend.as_ref(),
            &self.owner_id,
            appointment_id,
            index,
            checked,
            self.clock.today(),
        )
        .await?;
        self.refresh().await;
        Ok(outcome)
    }

    pub async fn replace_requirements(
        &self,
        appointment_id: &str,
        requirements: Vec<Requirement>,
    ) -> Result<RequirementEdit> {
        let edit = edit_requirements(
            self.backend.as_ref(),
            &self.owner_id,
            appointment_id,
            requirements,
            self.clock.today(),
        )
        .await?;
        self.refresh().await;
        Ok(edit)
    }

    pub async fn plan_now(&self) -> Result<PlanOutcome> {
        let mut rng = StdRng::from_entropy();
        let outcome = plan_improvements(
            self.backend.as_ref(),
            &self.owner_id,
            self.clock.today(),
            &self.settings.planner,
            &mut rng,
        )
        .await?;
        self.refresh().await;
        Ok(outcome)
    }
}

async fn refresh_loop(controller: AgendaController, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(controller.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.refresh().await;
            }
            _ = controller.changed.notified() => {
                log_info!("change notification for {}, refreshing", controller.owner_id);
                controller.refresh().await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("agenda refresh loop shutting down");
                break;
            }
        }
    }
}
