//! Per-run configuration snapshot.
//!
//! [`GuildRoleConfig`] is built once per run from the guild settings store and
//! shared immutably (behind an `Arc`) with every resolver call in that run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Duration;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use rolesync_core::ids::{ClanTag, GuildId, PlayerTag, RoleId};
use rolesync_core::roles::RoleSet;
use rolesync_core::settings::{AccountPreference, SettingKey, TrackedClan};
use rolesync_core::sources::{GameClient, GuildSettings};

use crate::error::EngineError;

pub const DEFAULT_FAMILY_NICKNAME_FORMAT: &str = "{NAME} | {ALIAS}";
pub const DEFAULT_NON_FAMILY_NICKNAME_FORMAT: &str = "{NAME}";

/// Debounce durations. A zero duration disables that direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayConfig {
    pub deletion: Duration,
    pub addition: Duration,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            deletion: Duration::zero(),
            addition: Duration::zero(),
        }
    }
}

impl DelayConfig {
    pub fn is_disabled(&self) -> bool {
        self.deletion <= Duration::zero() && self.addition <= Duration::zero()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NicknameConfig {
    pub enabled: bool,
    pub family_format: String,
    pub non_family_format: String,
    pub preference: AccountPreference,
}

impl Default for NicknameConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            family_format: DEFAULT_FAMILY_NICKNAME_FORMAT.to_string(),
            non_family_format: DEFAULT_NON_FAMILY_NICKNAME_FORMAT.to_string(),
            preference: AccountPreference::Default,
        }
    }
}

/// A guild's role-mapping rules, frozen for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuildRoleConfig {
    /// Tracked clans, sorted by configured order.
    pub clans: Vec<TrackedClan>,
    pub town_hall_roles: BTreeMap<u32, RoleId>,
    pub builder_hall_roles: BTreeMap<u32, RoleId>,
    pub league_roles: BTreeMap<u32, RoleId>,
    pub builder_league_roles: BTreeMap<u32, RoleId>,
    pub family_role: Option<RoleId>,
    pub exclusive_family_role: Option<RoleId>,
    pub guest_role: Option<RoleId>,
    pub verified_role: Option<RoleId>,
    pub account_linked_role: Option<RoleId>,
    pub family_leader_roles: RoleSet,
    pub eos_push_clans: BTreeSet<ClanTag>,
    pub eos_push_roles: RoleSet,
    /// Gates town-hall and builder-hall roles for non-family members.
    pub allow_non_family_town_hall: bool,
    /// Gates league and builder-league roles for non-family members.
    pub allow_non_family_league: bool,
    pub verified_only_clan_roles: bool,
    pub delays: DelayConfig,
    pub nickname: NicknameConfig,
}

fn read<T: DeserializeOwned + Default>(
    values: &HashMap<SettingKey, Value>,
    key: SettingKey,
) -> Result<T, EngineError> {
    match values.get(&key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Config(format!("{key}: {e}"))),
    }
}

fn read_secs(values: &HashMap<SettingKey, Value>, key: SettingKey) -> Result<Duration, EngineError> {
    let secs: u64 = read(values, key)?;
    let secs = i64::try_from(secs).map_err(|_| EngineError::Config(format!("{key}: out of range")))?;
    Duration::try_seconds(secs).ok_or_else(|| EngineError::Config(format!("{key}: out of range")))
}

impl GuildRoleConfig {
    pub fn from_settings(values: &HashMap<SettingKey, Value>) -> Result<Self, EngineError> {
        let mut clans: Vec<TrackedClan> = read(values, SettingKey::Clans)?;
        clans.sort_by_key(|c| c.order);
        let family_leader_roles: Vec<RoleId> = read(values, SettingKey::FamilyLeaderRoles)?;
        let eos_push_clans: Vec<ClanTag> = read(values, SettingKey::EosPushClans)?;
        let eos_push_roles: Vec<RoleId> = read(values, SettingKey::EosPushClanRoles)?;
        let family_format: Option<String> = read(values, SettingKey::FamilyNicknameFormat)?;
        let non_family_format: Option<String> = read(values, SettingKey::NonFamilyNicknameFormat)?;

        Ok(Self {
            clans,
            town_hall_roles: read(values, SettingKey::TownHallRoles)?,
            builder_hall_roles: read(values, SettingKey::BuilderHallRoles)?,
            league_roles: read(values, SettingKey::LeagueRoles)?,
            builder_league_roles: read(values, SettingKey::BuilderLeagueRoles)?,
            family_role: read(values, SettingKey::FamilyRole)?,
            exclusive_family_role: read(values, SettingKey::ExclusiveFamilyRole)?,
            guest_role: read(values, SettingKey::GuestRole)?,
            verified_role: read(values, SettingKey::VerifiedRole)?,
            account_linked_role: read(values, SettingKey::AccountLinkedRole)?,
            family_leader_roles: family_leader_roles.into_iter().collect(),
            eos_push_clans: eos_push_clans.into_iter().collect(),
            eos_push_roles: eos_push_roles.into_iter().collect(),
            allow_non_family_town_hall: read(values, SettingKey::AllowNonFamilyTownHallRoles)?,
            allow_non_family_league: read(values, SettingKey::AllowNonFamilyLeagueRoles)?,
            verified_only_clan_roles: read(values, SettingKey::VerifiedOnlyClanRoles)?,
            delays: DelayConfig {
                deletion: read_secs(values, SettingKey::RoleRemovalDelaySecs)?,
                addition: read_secs(values, SettingKey::RoleAdditionDelaySecs)?,
            },
            nickname: NicknameConfig {
                enabled: read(values, SettingKey::AutoNickname)?,
                family_format: family_format
                    .unwrap_or_else(|| DEFAULT_FAMILY_NICKNAME_FORMAT.to_string()),
                non_family_format: non_family_format
                    .unwrap_or_else(|| DEFAULT_NON_FAMILY_NICKNAME_FORMAT.to_string()),
                preference: read(values, SettingKey::NicknameAccountPreference)?,
            },
        })
    }

    pub fn clan(&self, tag: &ClanTag) -> Option<&TrackedClan> {
        self.clans.iter().find(|c| &c.tag == tag)
    }

    pub fn is_tracked(&self, tag: &ClanTag) -> bool {
        self.clan(tag).is_some()
    }

    pub fn has_war_roles(&self) -> bool {
        self.clans.iter().any(|c| c.roles.war.is_some())
    }

    /// Every role this guild manages. Anything outside it is never touched.
    pub fn targeted_roles(&self) -> RoleSet {
        let mut roles = RoleSet::new();
        for clan in &self.clans {
            for role in clan.roles.clan_roles() {
                roles.insert(role.clone());
            }
            roles.insert_opt(clan.roles.war.as_ref());
        }
        for map in [
            &self.town_hall_roles,
            &self.builder_hall_roles,
            &self.league_roles,
            &self.builder_league_roles,
        ] {
            for role in map.values() {
                roles.insert(role.clone());
            }
        }
        for role in [
            &self.family_role,
            &self.exclusive_family_role,
            &self.guest_role,
            &self.verified_role,
            &self.account_linked_role,
        ] {
            roles.insert_opt(role.as_ref());
        }
        roles.extend(&self.family_leader_roles);
        roles.extend(&self.eos_push_roles);
        roles
    }

    /// Roles applied immediately regardless of delay configuration.
    pub fn delay_exempt_roles(&self) -> RoleSet {
        let mut roles = RoleSet::new();
        roles.insert_opt(self.verified_role.as_ref());
        roles.insert_opt(self.account_linked_role.as_ref());
        roles
    }
}

/// Everything a run needs besides the members themselves.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub guild_id: GuildId,
    pub config: Arc<GuildRoleConfig>,
    /// Players in an active war, keyed by tag, with the tracked clans they fight for.
    pub war_members: HashMap<PlayerTag, Vec<ClanTag>>,
}

impl RunContext {
    pub fn war_clans(&self, tag: &PlayerTag) -> Vec<ClanTag> {
        self.war_members.get(tag).cloned().unwrap_or_default()
    }
}

/// Build the run snapshot for `guild`. Wars are fetched once per run, and
/// only when some clan has a war role configured.
#[instrument(skip(settings, game), fields(guild_id = %guild))]
pub async fn assemble(
    guild: &GuildId,
    settings: &dyn GuildSettings,
    game: &dyn GameClient,
) -> Result<RunContext, EngineError> {
    let mut values = settings.all(guild).await?;
    if !values.contains_key(&SettingKey::VerifiedOnlyClanRoles) {
        settings
            .set(guild, SettingKey::VerifiedOnlyClanRoles, Value::Bool(false))
            .await?;
        values.insert(SettingKey::VerifiedOnlyClanRoles, Value::Bool(false));
        debug!("initialised verified_only_clan_roles");
    }

    let config = GuildRoleConfig::from_settings(&values)?;
    let war_members = if config.has_war_roles() {
        fetch_war_members(&config, game).await?
    } else {
        HashMap::new()
    };
    debug!(
        clans = config.clans.len(),
        at_war = war_members.len(),
        "assembled run context"
    );

    Ok(RunContext {
        guild_id: guild.clone(),
        config: Arc::new(config),
        war_members,
    })
}

async fn fetch_war_members(
    config: &GuildRoleConfig,
    game: &dyn GameClient,
) -> Result<HashMap<PlayerTag, Vec<ClanTag>>, EngineError> {
    let warring: Vec<&TrackedClan> = config
        .clans
        .iter()
        .filter(|c| c.roles.war.is_some())
        .collect();
    let results = try_join_all(warring.iter().map(|c| game.current_wars(&c.tag))).await?;

    let mut members: HashMap<PlayerTag, Vec<ClanTag>> = HashMap::new();
    for (clan, wars) in warring.iter().zip(results) {
        for war in wars.iter().filter(|w| w.state.is_active()) {
            for tag in &war.member_tags {
                let clans = members.entry(tag.clone()).or_default();
                if !clans.contains(&clan.tag) {
                    clans.push(clan.tag.clone());
                }
            }
        }
    }
    Ok(members)
}
