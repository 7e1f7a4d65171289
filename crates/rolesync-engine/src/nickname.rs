//! Nickname resolution. Pure; no I/O.

use rolesync_core::directory::{GuildInfo, GuildMember, NicknameEdit, NICKNAME_MAX_CHARS};
use rolesync_core::settings::AccountPreference;

use crate::context::GuildRoleConfig;
use crate::snapshot::PlayerSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclineReason {
    GuildOwner,
    MissingPermission,
    RoleHierarchy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NicknameDecision {
    Declined(DeclineReason),
    NoAction,
    Unset,
    SetName(String),
}

impl NicknameDecision {
    pub fn to_edit(&self) -> NicknameEdit {
        match self {
            Self::Declined(_) | Self::NoAction => NicknameEdit::Keep,
            Self::Unset => NicknameEdit::Clear,
            Self::SetName(name) => NicknameEdit::Set(name.clone()),
        }
    }
}

pub fn resolve(
    players: &[PlayerSnapshot],
    member: &GuildMember,
    guild: &GuildInfo,
    config: &GuildRoleConfig,
) -> NicknameDecision {
    if member.user_id == guild.owner_id {
        return NicknameDecision::Declined(DeclineReason::GuildOwner);
    }
    if !guild.bot.manage_nicknames {
        return NicknameDecision::Declined(DeclineReason::MissingPermission);
    }
    if guild.bot.highest_role_position <= guild.highest_position(&member.roles) {
        return NicknameDecision::Declined(DeclineReason::RoleHierarchy);
    }
    if !config.nickname.enabled {
        return NicknameDecision::NoAction;
    }

    let Some(preferred) = preferred_account(players, config) else {
        return unset(member);
    };
    let in_family = preferred.clan_tag().is_some_and(|t| config.is_tracked(t));
    let format = if in_family {
        &config.nickname.family_format
    } else {
        &config.nickname.non_family_format
    };

    let rendered = render(format, preferred, players, member, config);
    let name: String = rendered.trim().chars().take(NICKNAME_MAX_CHARS).collect();
    if name.is_empty() {
        return unset(member);
    }
    if member.nickname.as_deref() == Some(name.as_str()) {
        return NicknameDecision::NoAction;
    }
    NicknameDecision::SetName(name)
}

fn unset(member: &GuildMember) -> NicknameDecision {
    if member.nickname.is_none() {
        NicknameDecision::NoAction
    } else {
        NicknameDecision::Unset
    }
}

/// Pick the account the nickname describes. `players` is in link order.
pub fn preferred_account<'a>(
    players: &'a [PlayerSnapshot],
    config: &GuildRoleConfig,
) -> Option<&'a PlayerSnapshot> {
    let default = players.first()?;
    match config.nickname.preference {
        AccountPreference::Default => Some(default),
        AccountPreference::Best => best_account(players, config),
        AccountPreference::DefaultOrBest => {
            if default.clan_tag().is_some_and(|t| config.is_tracked(t)) {
                Some(default)
            } else {
                best_account(players, config)
            }
        }
    }
}

fn best_account<'a>(
    players: &'a [PlayerSnapshot],
    config: &GuildRoleConfig,
) -> Option<&'a PlayerSnapshot> {
    let family: Vec<&PlayerSnapshot> = players
        .iter()
        .filter(|p| p.clan_tag().is_some_and(|t| config.is_tracked(t)))
        .collect();
    let pool: Vec<&PlayerSnapshot> = if family.is_empty() {
        players.iter().collect()
    } else {
        family
    };
    // max_by_key keeps the last maximum; reverse so link order breaks full ties.
    pool.into_iter()
        .rev()
        .max_by_key(|p| (p.player.town_hall_level, p.hero_sum(), p.weapon_power()))
}

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

fn superscript(n: u32) -> String {
    n.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| SUPERSCRIPT_DIGITS[d as usize])
        .collect()
}

/// Clan aliases across all accounts, deduplicated, in configured clan order.
fn aliases(players: &[PlayerSnapshot], config: &GuildRoleConfig) -> String {
    let mut out: Vec<&str> = Vec::new();
    for clan in &config.clans {
        let Some(alias) = clan.alias.as_deref() else {
            continue;
        };
        if players.iter().any(|p| p.in_clan(&clan.tag)) && !out.contains(&alias) {
            out.push(alias);
        }
    }
    out.join(" | ")
}

fn placeholder(
    key: &str,
    preferred: &PlayerSnapshot,
    players: &[PlayerSnapshot],
    member: &GuildMember,
    config: &GuildRoleConfig,
) -> Option<String> {
    let tracked = preferred.clan_tag().and_then(|t| config.clan(t));
    let value = match key.to_ascii_uppercase().as_str() {
        "NAME" => preferred.player.name.clone(),
        "TH" => preferred.player.town_hall_level.to_string(),
        "TH_SMALL" => superscript(preferred.player.town_hall_level),
        "ROLE" => preferred
            .clan_role()
            .map(|r| r.label().to_string())
            .unwrap_or_default(),
        "CLAN" => preferred
            .player
            .clan
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        "ALIAS" => tracked
            .and_then(|c| c.alias.clone())
            .unwrap_or_default(),
        "ALIASES" => aliases(players, config),
        "DISCORD" => member.global_name().to_string(),
        "USERNAME" => member.username.clone(),
        _ => return None,
    };
    Some(value)
}

/// Substitute `{KEY}` placeholders. Unknown keys are left verbatim.
fn render(
    format: &str,
    preferred: &PlayerSnapshot,
    players: &[PlayerSnapshot],
    member: &GuildMember,
    config: &GuildRoleConfig,
) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match placeholder(key, preferred, players, member, config) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
