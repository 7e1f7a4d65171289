//! Game-side value types as returned by the game-data client.

use serde::{Deserialize, Serialize};

use crate::ids::{ClanTag, PlayerTag};

/// League id of the top (legend) league.
pub const LEGEND_LEAGUE_ID: u32 = 29_000_022;

/// Trophy count at which an account counts as pushing for end-of-season.
pub const EOS_PUSH_TROPHIES: u32 = 5_000;

/// In-game clan role. Ordering is precedence: `Member < Admin < CoLeader < Leader`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClanRole {
    Member = 1,
    Admin = 2,
    CoLeader = 3,
    Leader = 4,
}

impl ClanRole {
    /// Parse the API role string. Unrecognized strings yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "coLeader" => Some(Self::CoLeader),
            "leader" => Some(Self::Leader),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Member => "Member",
            Self::Admin => "Elder",
            Self::CoLeader => "Co-Leader",
            Self::Leader => "Leader",
        }
    }

    pub fn is_leadership(self) -> bool {
        matches!(self, Self::CoLeader | Self::Leader)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerClan {
    pub tag: ClanTag,
    pub name: String,
}

/// A player as fetched live from the game API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePlayer {
    pub tag: PlayerTag,
    pub name: String,
    pub town_hall_level: u32,
    pub town_hall_weapon_level: Option<u32>,
    pub builder_hall_level: Option<u32>,
    pub trophies: u32,
    pub league_id: Option<u32>,
    pub builder_league_id: Option<u32>,
    pub clan: Option<PlayerClan>,
    /// Raw role string from the API; see [`ClanRole::parse`].
    pub role: Option<String>,
    /// Home-village hero levels.
    pub hero_levels: Vec<u32>,
}

impl GamePlayer {
    pub fn clan_role(&self) -> Option<ClanRole> {
        self.role.as_deref().and_then(ClanRole::parse)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
}

impl WarState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparation | Self::InWar)
    }
}

/// One war a clan is engaged in, reduced to what role assignment needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanWar {
    pub state: WarState,
    pub clan_tag: ClanTag,
    /// Participants on `clan_tag`'s side.
    pub member_tags: Vec<PlayerTag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_precedence_is_total() {
        assert!(ClanRole::Member < ClanRole::Admin);
        assert!(ClanRole::Admin < ClanRole::CoLeader);
        assert!(ClanRole::CoLeader < ClanRole::Leader);
    }

    #[test]
    fn unknown_role_string_is_none() {
        assert_eq!(ClanRole::parse("coLeader"), Some(ClanRole::CoLeader));
        assert_eq!(ClanRole::parse("elder"), None);
        assert_eq!(ClanRole::parse(""), None);
    }

    #[test]
    fn active_war_states() {
        assert!(WarState::InWar.is_active());
        assert!(WarState::Preparation.is_active());
        assert!(!WarState::WarEnded.is_active());
        assert!(!WarState::NotInWar.is_active());
    }
}
