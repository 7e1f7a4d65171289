//! Settings type definitions. Every section implements [`Default`] and is
//! `#[serde(default)]`, so partial JSON files are valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSyncSettings {
    pub database: DatabaseSettings,
    pub game_api: GameApiSettings,
    pub discord: DiscordSettings,
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: crate::loader::home_dir().join("rolesync.db"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameApiSettings {
    pub base_url: String,
    pub token: String,
}

impl Default for GameApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.clashofclans.com/v1".to_string(),
            token: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    pub base_url: String,
    pub token: String,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            base_url: "https://discord.com/api/v10".to_string(),
            token: String::new(),
        }
    }
}

/// Reconciliation engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Player fetches in flight per run.
    pub fetch_concurrency: usize,
    /// Pause after each member edit.
    pub edit_delay_ms: u64,
    /// Period of the expired-delay sweep.
    pub sweep_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: 25,
            edit_delay_ms: 250,
            sweep_interval_secs: 60,
        }
    }
}

impl EngineSettings {
    pub fn edit_delay(&self) -> Duration {
        Duration::from_millis(self.edit_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
