use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tunables for the daily improvement planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlannerConfig {
    /// Minutes of improvement work planned per day
    pub budget_minutes: u32,

    /// Effort sizes an item may have to be planned at all
    pub allowed_blocks: Vec<u32>,

    pub max_tasks: usize,

    /// Optional share of the budget per category, in percent
    pub category_quotas: BTreeMap<String, u32>,

    /// Used when an item carries no effort estimate
    pub default_effort_minutes: u32,

    /// Used when scoring an item without priority
    pub default_priority: i64,

    /// Priority written on the planned task when the item has none
    pub default_task_priority: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            budget_minutes: 60,
            allowed_blocks: vec![25, 15],
            max_tasks: 4,
            category_quotas: BTreeMap::new(),
            default_effort_minutes: 25,
            default_priority: 3,
            default_task_priority: 2,
        }
    }
}

impl PlannerConfig {
    /// Minute allowance per category. Empty when no quota is configured.
    pub fn category_targets(&self) -> BTreeMap<String, u32> {
        let total: u32 = self.category_quotas.values().sum();
        if total == 0 {
            return BTreeMap::new();
        }
        self.category_quotas
            .iter()
            .map(|(category, percent)| {
                (category.clone(), percent * self.budget_minutes / 100)
            })
            .collect()
    }
}
