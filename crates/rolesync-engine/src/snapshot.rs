use rolesync_core::game::{ClanRole, GamePlayer};
use rolesync_core::ids::{ClanTag, PlayerTag};

/// One linked account as seen by the resolvers: live game data joined with
/// link metadata and current war participation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub player: GamePlayer,
    pub verified: bool,
    /// Tracked clans this account is currently at war for.
    pub war_clans: Vec<ClanTag>,
}

impl PlayerSnapshot {
    pub fn new(player: GamePlayer, verified: bool, war_clans: Vec<ClanTag>) -> Self {
        Self {
            player,
            verified,
            war_clans,
        }
    }

    pub fn tag(&self) -> &PlayerTag {
        &self.player.tag
    }

    pub fn clan_tag(&self) -> Option<&ClanTag> {
        self.player.clan.as_ref().map(|c| &c.tag)
    }

    pub fn clan_role(&self) -> Option<ClanRole> {
        self.player.clan_role()
    }

    pub fn in_clan(&self, tag: &ClanTag) -> bool {
        self.clan_tag() == Some(tag)
    }

    pub fn hero_sum(&self) -> u32 {
        self.player.hero_levels.iter().sum()
    }

    /// Town hall with its weapon upgrade folded in, for tie-breaking.
    pub fn weapon_power(&self) -> u32 {
        self.player.town_hall_level * 10 + self.player.town_hall_weapon_level.unwrap_or(0)
    }
}
