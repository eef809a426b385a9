pub mod commands;
pub mod config;
pub mod planner;

pub use config::PlannerConfig;
pub use planner::{plan_improvements, PlanOutcome, PlanReason};
