//! Chat-platform guild/member view.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{GuildId, RoleId, UserId};
use crate::roles::RoleSet;

/// Platform nickname length limit, in characters.
pub const NICKNAME_MAX_CHARS: usize = 32;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotPermissions {
    pub manage_roles: bool,
    pub manage_nicknames: bool,
    /// Position of the bot's highest role.
    pub highest_role_position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: GuildId,
    pub owner_id: UserId,
    pub bot: BotPermissions,
    pub role_positions: HashMap<RoleId, i64>,
}

impl GuildInfo {
    pub fn role_position(&self, role: &RoleId) -> Option<i64> {
        self.role_positions.get(role).copied()
    }

    /// Highest position among `roles`; members with no roles sit at 0.
    pub fn highest_position(&self, roles: &RoleSet) -> i64 {
        roles
            .iter()
            .filter_map(|r| self.role_position(r))
            .max()
            .unwrap_or(0)
    }

    /// The bot can only assign roles strictly below its own highest role.
    /// Unknown roles (deleted from the guild) are never manageable.
    pub fn can_manage_role(&self, role: &RoleId) -> bool {
        self.bot.manage_roles
            && self
                .role_position(role)
                .is_some_and(|pos| pos < self.bot.highest_role_position)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub roles: RoleSet,
    pub bot: bool,
}

impl GuildMember {
    /// Name shown on the platform absent a nickname.
    pub fn global_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Nickname part of an edit: leave untouched, clear, or set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "value")]
pub enum NicknameEdit {
    #[default]
    Keep,
    Clear,
    Set(String),
}

/// A single atomic member edit: the full resulting role list plus nickname.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEdit {
    pub roles: Option<RoleSet>,
    pub nickname: NicknameEdit,
}

impl MemberEdit {
    pub fn is_noop(&self) -> bool {
        self.roles.is_none() && self.nickname == NicknameEdit::Keep
    }
}
