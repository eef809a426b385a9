pub mod appointment;
pub mod improvement;
pub mod routine;
pub mod task;

pub use appointment::{Appointment, Requirement};
pub use improvement::Improvement;
pub use routine::{RoutinePatch, RoutineRecord};
pub use task::{ImprovementTaskUpsert, RequirementTaskUpsert, TaskPatch, TaskRecord};
