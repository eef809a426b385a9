pub mod commands;
pub mod sync;

pub use sync::{
    edit_requirements, handle_task_deleted, set_requirement_checked, toggle_task_completion,
    MirrorOutcome, RequirementEdit, TaskToggle,
};
