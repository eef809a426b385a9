use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::agenda::{DropSide, DropTarget, MinuteOfDay};

/// Homeboard: today's household agenda from the terminal.
#[derive(Parser, Debug)]
#[command(name = "homeboard", version, about)]
pub struct Cli {
    /// Whose agenda to work on. Falls back to the saved owner.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Directory holding the database and settings.
    #[arg(long, global = true, env = "HOMEBOARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Print JSON instead of cards.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show today's agenda (default).
    Today {
        /// Include the completed section.
        #[arg(long)]
        all: bool,
    },

    /// Keep the agenda on screen and refresh it until Ctrl+C.
    Watch,

    /// Save the default owner.
    Owner { owner_id: String },

    /// Add a task for today or another day.
    Add {
        description: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        start: Option<MinuteOfDay>,
        #[arg(long)]
        end: Option<MinuteOfDay>,
    },

    /// Move a task next to another card or into a list position.
    Move(MoveArgs),

    /// Check or uncheck a task.
    Toggle { id: String },

    /// Edit the description, date or times of a task or routine.
    Edit {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        start: Option<MinuteOfDay>,
        #[arg(long)]
        end: Option<MinuteOfDay>,
    },

    /// Delete a task, or a routine with `--routine`.
    Delete {
        id: String,
        #[arg(long)]
        routine: bool,
    },

    /// Appointment checklists.
    #[command(subcommand)]
    Requirement(RequirementCommand),

    /// Plan today's improvement tasks now.
    Plan,

    /// List the active improvement backlog.
    Backlog,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["before", "after", "position"])))]
pub struct MoveArgs {
    pub id: String,
    /// Drop in the free time right before this card.
    #[arg(long, value_name = "CARD")]
    pub before: Option<String>,
    /// Drop in the free time right after this card.
    #[arg(long, value_name = "CARD")]
    pub after: Option<String>,
    /// Drop at this index of the open list.
    #[arg(long, value_name = "INDEX")]
    pub position: Option<usize>,
    /// Only show the slot the drop would get.
    #[arg(long)]
    pub dry_run: bool,
}

impl MoveArgs {
    pub fn target(&self) -> Option<DropTarget> {
        if let Some(id) = &self.before {
            return Some(DropTarget::Card {
                id: id.clone(),
                side: DropSide::Before,
            });
        }
        if let Some(id) = &self.after {
            return Some(DropTarget::Card {
                id: id.clone(),
                side: DropSide::After,
            });
        }
        self.position.map(DropTarget::Position)
    }
}

#[derive(Subcommand, Debug)]
pub enum RequirementCommand {
    /// Show an appointment's checklist.
    Show { appointment_id: String },

    /// Check one entry (zero-based index).
    Check {
        appointment_id: String,
        index: usize,
        #[arg(long)]
        uncheck: bool,
    },

    /// Replace the checklist. Unchanged entries stay checked.
    Set {
        appointment_id: String,
        #[arg(long = "item", value_name = "TEXT")]
        items: Vec<String>,
    },
}
