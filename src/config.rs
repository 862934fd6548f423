use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarConfig, CalendarResolver};
use crate::error::{LedgerError, Result};
use crate::ledger::LedgerPolicy;

pub const DEFAULT_CHAT_EVENTS: usize = 15;
pub const DEFAULT_INSIGHT_EVENTS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryWindow {
    #[serde(default = "default_chat_events")]
    pub chat_events: usize,
    #[serde(default = "default_insight_events")]
    pub insight_events: usize,
}

impl Default for AdvisoryWindow {
    fn default() -> Self {
        Self {
            chat_events: DEFAULT_CHAT_EVENTS,
            insight_events: DEFAULT_INSIGHT_EVENTS,
        }
    }
}

fn default_chat_events() -> usize {
    DEFAULT_CHAT_EVENTS
}

fn default_insight_events() -> usize {
    DEFAULT_INSIGHT_EVENTS
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub reject_unresolved_owners: bool,
    #[serde(default)]
    pub advisory: AdvisoryWindow,
}

impl AppConfig {
    /// Reads a JSON config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|err| {
            LedgerError::Config(format!("unable to read {}: {err}", path.display()))
        })?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.resolver()?;
        Ok(config)
    }

    pub fn resolver(&self) -> Result<CalendarResolver> {
        CalendarResolver::new(self.calendar.clone())
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            reject_unresolved_owners: self.reject_unresolved_owners,
        }
    }
}
