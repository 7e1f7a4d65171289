//! Collaborator interfaces the engine consumes.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::directory::{GuildInfo, GuildMember, MemberEdit};
use crate::errors::{DirectoryError, FetchError, SourceError};
use crate::game::{ClanWar, GamePlayer};
use crate::ids::{ClanTag, GuildId, PlayerTag, UserId};
use crate::links::LinkedAccount;
use crate::settings::SettingKey;

/// Live game data.
#[async_trait]
pub trait GameClient: Send + Sync {
    /// `Ok(None)` when the player no longer exists.
    async fn player(&self, tag: &PlayerTag) -> Result<Option<GamePlayer>, FetchError>;

    /// Wars the clan currently takes part in (may be empty).
    async fn current_wars(&self, clan: &ClanTag) -> Result<Vec<ClanWar>, FetchError>;
}

/// Chat-platform member/role directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn guild(&self, guild: &GuildId) -> Result<GuildInfo, DirectoryError>;

    async fn members(&self, guild: &GuildId) -> Result<Vec<GuildMember>, DirectoryError>;

    /// `Ok(None)` when the user is not a member of the guild.
    async fn member(
        &self,
        guild: &GuildId,
        user: &UserId,
    ) -> Result<Option<GuildMember>, DirectoryError>;

    /// Apply roles and nickname in one call.
    async fn edit_member(
        &self,
        guild: &GuildId,
        user: &UserId,
        edit: &MemberEdit,
    ) -> Result<(), DirectoryError>;
}

/// Linked accounts. Implementations never return soft-deleted links, and
/// return each user's accounts ordered by `order`.
#[async_trait]
pub trait LinkedAccounts: Send + Sync {
    async fn by_users(&self, users: &[UserId]) -> Result<Vec<LinkedAccount>, SourceError>;

    async fn by_tags(&self, tags: &[PlayerTag]) -> Result<Vec<LinkedAccount>, SourceError>;
}

/// Per-guild key/value configuration.
#[async_trait]
pub trait GuildSettings: Send + Sync {
    async fn all(&self, guild: &GuildId) -> Result<HashMap<SettingKey, serde_json::Value>, SourceError>;

    async fn set(
        &self,
        guild: &GuildId,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), SourceError>;

    /// Guilds whose tracked clans include `clan`.
    async fn guilds_for_clan(&self, clan: &ClanTag) -> Result<Vec<GuildId>, SourceError>;
}
