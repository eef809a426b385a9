use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::improvements::PlannerConfig;

const DEFAULT_REFRESH_SECS: u64 = 60;
const DEBUG_REFRESH_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgendaSettings {
    /// Whose agenda the CLI shows when `--owner` is not given.
    pub owner_id: Option<String>,
    pub refresh_interval_secs: u64,
    pub plan_improvements: bool,
    pub planner: PlannerConfig,
}

impl Default for AgendaSettings {
    fn default() -> Self {
        Self {
            owner_id: None,
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            plan_improvements: true,
            planner: PlannerConfig::default(),
        }
    }
}

impl AgendaSettings {
    /// Refresh period for the agenda loop. `HOMEBOARD_DEBUG=1` shortens it.
    pub fn refresh_interval(&self) -> Duration {
        if debug_mode() {
            return Duration::from_secs(DEBUG_REFRESH_SECS);
        }
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

pub fn debug_mode() -> bool {
    std::env::var("HOMEBOARD_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AgendaSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log::warn!("Ignoring unreadable settings at {}: {err}", path.display());
                    AgendaSettings::default()
                }
            }
        } else {
            AgendaSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, AgendaSettings>> {
        self.data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, AgendaSettings>> {
        self.data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    pub fn agenda(&self) -> Result<AgendaSettings> {
        Ok(self.read()?.clone())
    }

    pub fn update_agenda(&self, settings: AgendaSettings) -> Result<()> {
        let mut guard = self.write()?;
        *guard = settings;
        self.persist(&guard)
    }

    pub fn set_owner(&self, owner_id: &str) -> Result<()> {
        let mut guard = self.write()?;
        guard.owner_id = Some(owner_id.to_string());
        self.persist(&guard)
    }

    fn persist(&self, data: &AgendaSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: AgendaSettings = serde_json::from_str(&contents)?;
        *self.write()? = data;
        Ok(())
    }
}
