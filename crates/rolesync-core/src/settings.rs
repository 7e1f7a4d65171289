//! Per-guild setting keys and the structured values stored under them.

use serde::{Deserialize, Serialize};

use crate::game::ClanRole;
use crate::ids::{ClanTag, RoleId};

/// Every key the engine reads from the guild settings store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Clans,
    TownHallRoles,
    BuilderHallRoles,
    LeagueRoles,
    BuilderLeagueRoles,
    FamilyRole,
    ExclusiveFamilyRole,
    GuestRole,
    VerifiedRole,
    AccountLinkedRole,
    FamilyLeaderRoles,
    EosPushClans,
    EosPushClanRoles,
    AllowNonFamilyTownHallRoles,
    AllowNonFamilyLeagueRoles,
    VerifiedOnlyClanRoles,
    RoleRemovalDelaySecs,
    RoleAdditionDelaySecs,
    AutoNickname,
    FamilyNicknameFormat,
    NonFamilyNicknameFormat,
    NicknameAccountPreference,
}

impl SettingKey {
    pub const ALL: [SettingKey; 22] = [
        Self::Clans,
        Self::TownHallRoles,
        Self::BuilderHallRoles,
        Self::LeagueRoles,
        Self::BuilderLeagueRoles,
        Self::FamilyRole,
        Self::ExclusiveFamilyRole,
        Self::GuestRole,
        Self::VerifiedRole,
        Self::AccountLinkedRole,
        Self::FamilyLeaderRoles,
        Self::EosPushClans,
        Self::EosPushClanRoles,
        Self::AllowNonFamilyTownHallRoles,
        Self::AllowNonFamilyLeagueRoles,
        Self::VerifiedOnlyClanRoles,
        Self::RoleRemovalDelaySecs,
        Self::RoleAdditionDelaySecs,
        Self::AutoNickname,
        Self::FamilyNicknameFormat,
        Self::NonFamilyNicknameFormat,
        Self::NicknameAccountPreference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clans => "clans",
            Self::TownHallRoles => "town_hall_roles",
            Self::BuilderHallRoles => "builder_hall_roles",
            Self::LeagueRoles => "league_roles",
            Self::BuilderLeagueRoles => "builder_league_roles",
            Self::FamilyRole => "family_role",
            Self::ExclusiveFamilyRole => "exclusive_family_role",
            Self::GuestRole => "guest_role",
            Self::VerifiedRole => "verified_role",
            Self::AccountLinkedRole => "account_linked_role",
            Self::FamilyLeaderRoles => "family_leader_roles",
            Self::EosPushClans => "eos_push_clans",
            Self::EosPushClanRoles => "eos_push_clan_roles",
            Self::AllowNonFamilyTownHallRoles => "allow_non_family_town_hall_roles",
            Self::AllowNonFamilyLeagueRoles => "allow_non_family_league_roles",
            Self::VerifiedOnlyClanRoles => "verified_only_clan_roles",
            Self::RoleRemovalDelaySecs => "role_removal_delay_secs",
            Self::RoleAdditionDelaySecs => "role_addition_delay_secs",
            Self::AutoNickname => "auto_nickname",
            Self::FamilyNicknameFormat => "family_nickname_format",
            Self::NonFamilyNicknameFormat => "non_family_nickname_format",
            Self::NicknameAccountPreference => "nickname_account_preference",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettingKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown setting key: {s}"))
    }
}

/// Role ids configured for one tracked clan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClanRoleIds {
    pub member: Option<RoleId>,
    pub admin: Option<RoleId>,
    pub co_leader: Option<RoleId>,
    pub leader: Option<RoleId>,
    pub everyone: Option<RoleId>,
    pub war: Option<RoleId>,
}

impl ClanRoleIds {
    pub fn for_role(&self, role: ClanRole) -> Option<&RoleId> {
        match role {
            ClanRole::Member => self.member.as_ref(),
            ClanRole::Admin => self.admin.as_ref(),
            ClanRole::CoLeader => self.co_leader.as_ref(),
            ClanRole::Leader => self.leader.as_ref(),
        }
    }

    /// Every non-war role id configured for the clan.
    pub fn clan_roles(&self) -> impl Iterator<Item = &RoleId> {
        [
            &self.member,
            &self.admin,
            &self.co_leader,
            &self.leader,
            &self.everyone,
        ]
        .into_iter()
        .flatten()
    }
}

/// A clan the guild tracks ("family" clan).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedClan {
    pub tag: ClanTag,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub roles: ClanRoleIds,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountPreference {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "default-or-best")]
    DefaultOrBest,
}
