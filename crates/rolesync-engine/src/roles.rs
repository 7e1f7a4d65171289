//! Role resolution: linked accounts plus the guild snapshot in, desired role
//! sets out. Pure; no I/O.

use rolesync_core::game::{EOS_PUSH_TROPHIES, LEGEND_LEAGUE_ID};
use rolesync_core::roles::RoleSet;

use crate::context::GuildRoleConfig;
use crate::snapshot::PlayerSnapshot;

/// `included ∪ excluded` is always exactly the guild's targeted roles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleDecision {
    pub included: RoleSet,
    pub excluded: RoleSet,
}

/// Aggregate membership flags across all of a member's accounts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FamilyStatus {
    pub in_family: bool,
    pub family_leader: bool,
    /// Every account sits in a tracked clan with a recognized role.
    pub exclusive: bool,
}

impl FamilyStatus {
    pub fn of(players: &[PlayerSnapshot], config: &GuildRoleConfig) -> Self {
        let tracked = |p: &PlayerSnapshot| p.clan_tag().is_some_and(|t| config.is_tracked(t));
        Self {
            in_family: players.iter().any(|p| tracked(p)),
            family_leader: players
                .iter()
                .any(|p| tracked(p) && p.clan_role().is_some_and(|r| r.is_leadership())),
            exclusive: !players.is_empty()
                && players
                    .iter()
                    .all(|p| tracked(p) && p.clan_role().is_some()),
        }
    }
}

pub fn resolve(players: &[PlayerSnapshot], config: &GuildRoleConfig) -> RoleDecision {
    let status = FamilyStatus::of(players, config);
    let mut included = RoleSet::new();

    for clan in &config.clans {
        if players.iter().any(|p| p.war_clans.contains(&clan.tag)) {
            included.insert_opt(clan.roles.war.as_ref());
        }

        let qualifying: Vec<&PlayerSnapshot> = players
            .iter()
            .filter(|p| p.in_clan(&clan.tag))
            .filter(|p| !config.verified_only_clan_roles || p.verified)
            .collect();
        if qualifying.is_empty() {
            continue;
        }
        let role = qualifying
            .iter()
            .filter_map(|p| p.clan_role())
            .max()
            .and_then(|r| clan.roles.for_role(r))
            .or(clan.roles.everyone.as_ref());
        included.insert_opt(role);
    }

    let hall_roles = config.allow_non_family_town_hall || status.in_family;
    let league_roles = config.allow_non_family_league || status.in_family;
    for p in players {
        let player = &p.player;
        if hall_roles {
            included.insert_opt(config.town_hall_roles.get(&player.town_hall_level));
            if let Some(level) = player.builder_hall_level {
                included.insert_opt(config.builder_hall_roles.get(&level));
            }
        }
        if league_roles {
            if let Some(league) = player.league_id {
                included.insert_opt(config.league_roles.get(&league));
            }
            if let Some(league) = player.builder_league_id {
                included.insert_opt(config.builder_league_roles.get(&league));
            }
        }

        let pushing = player.league_id == Some(LEGEND_LEAGUE_ID) || player.trophies >= EOS_PUSH_TROPHIES;
        if pushing && p.clan_tag().is_some_and(|t| config.eos_push_clans.contains(t)) {
            included.extend(&config.eos_push_roles);
        }

        if p.verified {
            included.insert_opt(config.verified_role.as_ref());
        }
        included.insert_opt(config.account_linked_role.as_ref());
    }

    if status.in_family {
        included.insert_opt(config.family_role.as_ref());
    } else if !players.is_empty() {
        included.insert_opt(config.guest_role.as_ref());
    }
    if status.family_leader {
        included.extend(&config.family_leader_roles);
    }
    if status.exclusive {
        included.insert_opt(config.exclusive_family_role.as_ref());
    }

    let targeted = config.targeted_roles();
    let included = included.intersection(&targeted);
    let excluded = targeted.difference(&included);
    RoleDecision { included, excluded }
}
