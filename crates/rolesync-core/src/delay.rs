//! Persisted per-user role timers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{GuildId, RoleId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayKind {
    Deletion,
    Addition,
}

impl DelayKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deletion => "deletion",
            Self::Addition => "addition",
        }
    }
}

impl std::fmt::Display for DelayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DelayKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deletion" => Ok(Self::Deletion),
            "addition" => Ok(Self::Addition),
            other => Err(format!("unknown delay kind: {other}")),
        }
    }
}

/// Pending timers for one `(guild, user)`. Absent when both maps are empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDelay {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub deletion_delays: BTreeMap<RoleId, DateTime<Utc>>,
    pub addition_delays: BTreeMap<RoleId, DateTime<Utc>>,
}

impl RoleDelay {
    pub fn empty(guild_id: GuildId, user_id: UserId) -> Self {
        Self {
            guild_id,
            user_id,
            deletion_delays: BTreeMap::new(),
            addition_delays: BTreeMap::new(),
        }
    }

    pub fn timers(&self, kind: DelayKind) -> &BTreeMap<RoleId, DateTime<Utc>> {
        match kind {
            DelayKind::Deletion => &self.deletion_delays,
            DelayKind::Addition => &self.addition_delays,
        }
    }

    fn timers_mut(&mut self, kind: DelayKind) -> &mut BTreeMap<RoleId, DateTime<Utc>> {
        match kind {
            DelayKind::Deletion => &mut self.deletion_delays,
            DelayKind::Addition => &mut self.addition_delays,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deletion_delays.is_empty() && self.addition_delays.is_empty()
    }

    pub fn apply(&mut self, update: &DelayUpdate) {
        for kind in [DelayKind::Deletion, DelayKind::Addition] {
            let timers = self.timers_mut(kind);
            for role in update.unset_for(kind) {
                timers.remove(role);
            }
            for (role, at) in update.set_for(kind) {
                timers.insert(role.clone(), *at);
            }
        }
    }
}

/// Net timer changes from one reconciliation, applied as a partial update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayUpdate {
    pub set_deletion: BTreeMap<RoleId, DateTime<Utc>>,
    pub unset_deletion: BTreeSet<RoleId>,
    pub set_addition: BTreeMap<RoleId, DateTime<Utc>>,
    pub unset_addition: BTreeSet<RoleId>,
}

impl DelayUpdate {
    pub fn is_empty(&self) -> bool {
        self.set_deletion.is_empty()
            && self.unset_deletion.is_empty()
            && self.set_addition.is_empty()
            && self.unset_addition.is_empty()
    }

    pub fn set(&mut self, kind: DelayKind, role: RoleId, at: DateTime<Utc>) {
        match kind {
            DelayKind::Deletion => self.set_deletion.insert(role, at),
            DelayKind::Addition => self.set_addition.insert(role, at),
        };
    }

    pub fn unset(&mut self, kind: DelayKind, role: RoleId) {
        match kind {
            DelayKind::Deletion => self.unset_deletion.insert(role),
            DelayKind::Addition => self.unset_addition.insert(role),
        };
    }

    pub fn set_for(&self, kind: DelayKind) -> &BTreeMap<RoleId, DateTime<Utc>> {
        match kind {
            DelayKind::Deletion => &self.set_deletion,
            DelayKind::Addition => &self.set_addition,
        }
    }

    pub fn unset_for(&self, kind: DelayKind) -> &BTreeSet<RoleId> {
        match kind {
            DelayKind::Deletion => &self.unset_deletion,
            DelayKind::Addition => &self.unset_addition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RoleDelay {
        RoleDelay::empty(GuildId::from_raw("g"), UserId::from_raw("u"))
    }

    #[test]
    fn apply_sets_and_unsets() {
        let now = Utc::now();
        let mut delay = row();
        let mut update = DelayUpdate::default();
        update.set(DelayKind::Deletion, RoleId::from_raw("a"), now);
        update.set(DelayKind::Addition, RoleId::from_raw("b"), now);
        delay.apply(&update);
        assert_eq!(delay.deletion_delays.len(), 1);
        assert_eq!(delay.addition_delays.len(), 1);

        let mut clear = DelayUpdate::default();
        clear.unset(DelayKind::Deletion, RoleId::from_raw("a"));
        clear.unset(DelayKind::Addition, RoleId::from_raw("b"));
        delay.apply(&clear);
        assert!(delay.is_empty());
    }

    #[test]
    fn kind_parses() {
        assert_eq!("deletion".parse::<DelayKind>().unwrap(), DelayKind::Deletion);
        assert!("later".parse::<DelayKind>().is_err());
    }
}
