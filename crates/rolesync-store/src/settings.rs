//! Per-guild key/value settings backing the guild role configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, warn};

use rolesync_core::errors::SourceError;
use rolesync_core::ids::{ClanTag, GuildId};
use rolesync_core::settings::{SettingKey, TrackedClan};
use rolesync_core::sources::GuildSettings;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "guild_settings";

#[derive(Clone)]
pub struct SettingsRepo {
    db: Database,
}

impl SettingsRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(guild_id = %guild, key = %key))]
    pub fn get(
        &self,
        guild: &GuildId,
        key: SettingKey,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM guild_settings WHERE guild_id = ?1 AND key = ?2")?;
            let mut rows = stmt.query([guild.as_str(), key.as_str()])?;
            match rows.next()? {
                Some(row) => {
                    let raw: String = row_helpers::get(row, 0, TABLE, "value")?;
                    row_helpers::parse_json(&raw, TABLE, "value").map(Some)
                }
                None => Ok(None),
            }
        })
    }

    /// Every known key set for a guild. Rows with unrecognized keys are skipped.
    #[instrument(skip(self), fields(guild_id = %guild))]
    pub fn all(&self, guild: &GuildId) -> Result<HashMap<SettingKey, serde_json::Value>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM guild_settings WHERE guild_id = ?1")?;
            let mut rows = stmt.query([guild.as_str()])?;
            let mut out = HashMap::new();
            while let Some(row) = rows.next()? {
                let key: String = row_helpers::get(row, 0, TABLE, "key")?;
                let raw: String = row_helpers::get(row, 1, TABLE, "value")?;
                match key.parse::<SettingKey>() {
                    Ok(key) => {
                        out.insert(key, row_helpers::parse_json(&raw, TABLE, "value")?);
                    }
                    Err(_) => warn!(key = %key, "ignoring unknown guild setting"),
                }
            }
            Ok(out)
        })
    }

    #[instrument(skip(self, value), fields(guild_id = %guild, key = %key))]
    pub fn set(
        &self,
        guild: &GuildId,
        key: SettingKey,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guild_settings (guild_id, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (guild_id, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![guild.as_str(), key.as_str(), raw, now],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, guild: &GuildId, key: SettingKey) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM guild_settings WHERE guild_id = ?1 AND key = ?2",
                [guild.as_str(), key.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    /// Guilds whose `clans` setting lists `clan`.
    #[instrument(skip(self), fields(clan_tag = %clan))]
    pub fn guilds_for_clan(&self, clan: &ClanTag) -> Result<Vec<GuildId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT guild_id, value FROM guild_settings WHERE key = ?1 ORDER BY guild_id",
            )?;
            let mut rows = stmt.query([SettingKey::Clans.as_str()])?;
            let mut guilds = Vec::new();
            while let Some(row) = rows.next()? {
                let guild: String = row_helpers::get(row, 0, TABLE, "guild_id")?;
                let raw: String = row_helpers::get(row, 1, TABLE, "value")?;
                let clans: Vec<TrackedClan> = match serde_json::from_str(&raw) {
                    Ok(clans) => clans,
                    Err(e) => {
                        warn!(guild_id = %guild, error = %e, "unreadable clans setting");
                        continue;
                    }
                };
                if clans.iter().any(|c| &c.tag == clan) {
                    guilds.push(GuildId::from_raw(guild));
                }
            }
            Ok(guilds)
        })
    }
}

#[async_trait]
impl GuildSettings for SettingsRepo {
    async fn all(&self, guild: &GuildId) -> Result<HashMap<SettingKey, serde_json::Value>, SourceError> {
        Ok(SettingsRepo::all(self, guild)?)
    }

    async fn set(
        &self,
        guild: &GuildId,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), SourceError> {
        Ok(SettingsRepo::set(self, guild, key, &value)?)
    }

    async fn guilds_for_clan(&self, clan: &ClanTag) -> Result<Vec<GuildId>, SourceError> {
        Ok(SettingsRepo::guilds_for_clan(self, clan)?)
    }
}
