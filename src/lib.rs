pub mod agenda;
mod cli;
pub mod db;
pub mod improvements;
pub mod requirements;
pub mod settings;
pub mod store;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use agenda::{
    commands::{
        attach_agenda, delete_activity, detach_agenda, drag_over, drop_activity, edit_activity,
        end_drag, get_agenda, refresh_agenda, start_drag, toggle_activity,
    },
    ActivityEdit, AgendaCard, AgendaController, AgendaSnapshot, Clock, SystemClock,
};
use cli::{Cli, Command, MoveArgs, RequirementCommand};
use db::{Database, TaskRecord};
use improvements::commands::{list_improvements, plan_improvements};
use requirements::commands::{get_appointment, set_requirement_checked, set_requirement_list};
use settings::SettingsStore;
use store::TaskStore;

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub agenda: AgendaController,
}

impl AppState {
    pub fn open(data_dir: PathBuf, owner: Option<String>) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let database = Database::new(data_dir.join("homeboard.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let agenda_settings = settings.agenda()?;

        let owner_id = owner
            .or_else(|| agenda_settings.owner_id.clone())
            .ok_or_else(|| anyhow!("no owner configured; pass --owner or run `homeboard owner <id>`"))?;

        let agenda = AgendaController::new(
            Arc::new(database.clone()),
            Arc::new(SystemClock),
            owner_id,
            agenda_settings,
        );

        Ok(Self {
            db: database,
            settings,
            agenda,
        })
    }
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(dir) => Ok(dir),
        None => dirs::data_dir()
            .map(|dir| dir.join("homeboard"))
            .ok_or_else(|| anyhow!("no data directory available; pass --data-dir")),
    }
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(dispatch(cli, data_dir))
}

async fn dispatch(cli: Cli, data_dir: PathBuf) -> Result<()> {
    let command = cli.command.unwrap_or(Command::Today { all: false });

    if let Command::Owner { owner_id } = &command {
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        settings.set_owner(owner_id)?;
        println!("Default owner set to {owner_id}");
        return Ok(());
    }

    log::info!("Homeboard starting up...");
    let state = AppState::open(data_dir, cli.owner)?;
    let json = cli.json;

    match command {
        Command::Today { all } => {
            let snapshot = get_agenda(&state).await.map_err(anyhow::Error::msg)?;
            print_snapshot(&snapshot, all, json)?;
        }
        Command::Watch => watch(&state, json).await?,
        Command::Owner { .. } => {}
        Command::Add {
            description,
            date,
            start,
            end,
        } => {
            let due = date.unwrap_or_else(|| SystemClock.today());
            let mut task = TaskRecord::new(state.agenda.owner_id(), description, due);
            if let Some((start, end)) = agenda::scheduler::normalize_range(
                start,
                end,
                agenda::activity::DEFAULT_TASK_MINUTES,
            ) {
                task = task.with_times(start, end);
            }
            state.db.insert_task(&task).await?;
            println!("{}", task.id);
        }
        Command::Move(args) => println!("{}", move_card(&state, args).await?),
        Command::Toggle { id } => {
            let toggle = toggle_activity(&state, id).await.map_err(anyhow::Error::msg)?;
            print_value(&toggle, json, || {
                if toggle.completed { "Completed".into() } else { "Reopened".into() }
            })?;
        }
        Command::Edit {
            id,
            description,
            date,
            start,
            end,
        } => {
            let edit = ActivityEdit {
                description,
                date,
                start,
                end,
            };
            edit_activity(&state, id, edit)
                .await
                .map_err(anyhow::Error::msg)?;
        }
        Command::Delete { id, routine } => {
            delete_activity(&state, id, routine)
                .await
                .map_err(anyhow::Error::msg)?;
        }
        Command::Requirement(command) => requirement(&state, command, json).await?,
        Command::Plan => {
            let outcome = plan_improvements(&state).await.map_err(anyhow::Error::msg)?;
            print_value(&outcome, json, || {
                format!("{:?}: {} planned", outcome.reason, outcome.planned.len())
            })?;
        }
        Command::Backlog => {
            let backlog = list_improvements(&state).await.map_err(anyhow::Error::msg)?;
            print_value(&backlog, json, || {
                backlog
                    .iter()
                    .map(|item| {
                        let priority = item.priority.map(|p| format!("P{p}")).unwrap_or_default();
                        format!("{priority:>3} {}  ({})", item.title, item.id)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
    }

    Ok(())
}

/// Runs one drag session for `move`. A dry run only reports the hint.
async fn move_card(state: &AppState, args: MoveArgs) -> Result<String> {
    let target = args
        .target()
        .ok_or_else(|| anyhow!("pick --before, --after or --position"))?;
    refresh_agenda(state).await.map_err(anyhow::Error::msg)?;
    start_drag(state, args.id).await.map_err(anyhow::Error::msg)?;

    let result = if args.dry_run {
        drag_over(state, target)
            .await
            .map(|preview| format!("Would land at {}", preview.hint()))
    } else {
        drop_activity(state, target)
            .await
            .map(|slot| format!("Moved to {slot}"))
    };
    end_drag(state).await.map_err(anyhow::Error::msg)?;
    result.map_err(anyhow::Error::msg)
}

async fn requirement(state: &AppState, command: RequirementCommand, json: bool) -> Result<()> {
    match command {
        RequirementCommand::Show { appointment_id } => {
            let appointment = get_appointment(state, appointment_id)
                .await
                .map_err(anyhow::Error::msg)?;
            print_value(&appointment.requirements, json, || {
                appointment
                    .requirements
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let mark = if item.checked { "x" } else { " " };
                        format!("{index}. [{mark}] {}", item.text)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        RequirementCommand::Check {
            appointment_id,
            index,
            uncheck,
        } => {
            let outcome = set_requirement_checked(state, appointment_id, index, !uncheck)
                .await
                .map_err(anyhow::Error::msg)?;
            if !outcome.is_consistent() {
                log::warn!("checklist and task disagree: {:?}", outcome.errors);
            }
            print_value(&outcome, json, || "Saved".into())
        }
        RequirementCommand::Set {
            appointment_id,
            items,
        } => {
            let edit = set_requirement_list(state, appointment_id, items)
                .await
                .map_err(anyhow::Error::msg)?;
            print_value(&edit, json, || {
                format!("{} entries, {} stale tasks removed", edit.upserted.len(), edit.deleted.len())
            })
        }
    }
}

async fn watch(state: &AppState, json: bool) -> Result<()> {
    attach_agenda(state).await.map_err(anyhow::Error::msg)?;

    let mut ticker = tokio::time::interval(state.agenda.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_shown = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = match state.agenda.snapshot().await {
                    Some(snapshot) => snapshot,
                    None => refresh_agenda(state).await.map_err(anyhow::Error::msg)?,
                };
                if last_shown != Some(snapshot.refreshed_at) {
                    last_shown = Some(snapshot.refreshed_at);
                    print_snapshot(&snapshot, false, json)?;
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                log::info!("received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    detach_agenda(state).await.map_err(anyhow::Error::msg)
}

fn print_value<T, F>(value: &T, json: bool, text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce() -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn print_snapshot(snapshot: &AgendaSnapshot, all: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!("{} · {} · {}", snapshot.owner_id, snapshot.date, snapshot.now);
    for failure in &snapshot.failures {
        println!("  ! {:?} ({}) failed: {}", failure.source, failure.channel.as_str(), failure.message);
    }
    if snapshot.cards.is_empty() {
        println!("  Nothing left for today");
    }
    for card in &snapshot.cards {
        println!("{}", card_line(card));
    }

    let completed = snapshot.completed_cards.len();
    if all {
        if completed > 0 {
            println!("Completed ({completed})");
        }
        for card in &snapshot.completed_cards {
            println!("{}", card_line(card));
        }
    } else if completed > 0 {
        println!("Completed ({completed}), use --all to show");
    }
    Ok(())
}

fn card_line(card: &AgendaCard) -> String {
    let mut line = format!("  {:<11} {:<13} {}", card.label, card.time_range, card.description);
    if !card.countdown.is_empty() {
        line.push_str(&format!("  [{}]", card.countdown));
    }
    line.push_str(&format!("  ({})", card.id));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ImprovementStore;

    #[test]
    fn card_lines_show_countdown_and_id() {
        let card = AgendaCard {
            id: "t1".into(),
            label: "Task",
            time_range: "10:00 - 10:30".into(),
            description: "call bank".into(),
            countdown: "Starts in 1 h 0 min".into(),
            bucket: agenda::Bucket::Upcoming,
            draggable: true,
            in_progress: false,
            starts_soon: false,
            deletable: true,
            checkable: true,
        };
        let line = card_line(&card);
        assert!(line.contains("10:00 - 10:30"));
        assert!(line.ends_with("[Starts in 1 h 0 min]  (t1)"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_data_dir(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[tokio::test]
    async fn move_runs_a_full_drag_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), Some("ana".into())).unwrap();
        let today = SystemClock.today();
        let anchor = TaskRecord::new("ana", "anchor", today).with_times(
            agenda::MinuteOfDay::parse("06:00").unwrap(),
            agenda::MinuteOfDay::parse("06:30").unwrap(),
        );
        let loose = TaskRecord::new("ana", "loose", today);
        state.db.insert_task(&anchor).await.unwrap();
        state.db.insert_task(&loose).await.unwrap();

        let args = |dry_run| MoveArgs {
            id: loose.id.clone(),
            before: None,
            after: Some(anchor.id.clone()),
            position: None,
            dry_run,
        };

        let hint = move_card(&state, args(true)).await.unwrap();
        assert!(hint.starts_with("Would land at "));
        assert_eq!(state.db.get_task(&loose.id).await.unwrap().unwrap().start_time, None);
        assert!(state.agenda.drag_hint().await.is_none());

        let moved = move_card(&state, args(false)).await.unwrap();
        assert!(moved.starts_with("Moved to "));
        assert!(state.db.get_task(&loose.id).await.unwrap().unwrap().start_time.is_some());

        let missing = MoveArgs { id: "nope".into(), ..args(false) };
        assert!(move_card(&state, missing).await.is_err());
    }

    #[tokio::test]
    async fn backlog_lists_active_improvements() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), Some("ana".into())).unwrap();
        assert!(list_improvements(&state).await.unwrap().is_empty());

        let improvement = db::models::Improvement {
            id: "i1".into(),
            owner_id: "ana".into(),
            title: "fix the gate".into(),
            priority: Some(2),
            effort_minutes: Some(30),
            category: None,
            cooldown_days: None,
            last_done_at: None,
            last_planned_at: None,
            is_active: true,
        };
        state.db.insert_improvement(&improvement).await.unwrap();
        let backlog = list_improvements(&state).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].title, "fix the gate");
    }

    #[test]
    fn opening_requires_an_owner() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppState::open(dir.path().to_path_buf(), None).is_err());

        let state = AppState::open(dir.path().to_path_buf(), Some("ana".into())).unwrap();
        assert_eq!(state.agenda.owner_id(), "ana");
        assert!(dir.path().join("homeboard.sqlite3").exists());
    }
}
