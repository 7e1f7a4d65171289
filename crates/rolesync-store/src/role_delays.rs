//! Durable per-user role timers.
//!
//! A logical `RoleDelay` for `(guild, user)` is stored as one row per pending
//! timer, so a partial update touches only the timers that changed and the
//! logical row vanishes when its last timer is unset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use rolesync_core::delay::{DelayKind, DelayUpdate, RoleDelay};
use rolesync_core::ids::{GuildId, RoleId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "role_delays";

#[derive(Clone)]
pub struct RoleDelayRepo {
    db: Database,
}

impl RoleDelayRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the timers for one member, `None` when none are pending.
    #[instrument(skip(self), fields(guild_id = %guild, user_id = %user))]
    pub fn get(&self, guild: &GuildId, user: &UserId) -> Result<Option<RoleDelay>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, role_id, expires_at FROM role_delays
                 WHERE guild_id = ?1 AND user_id = ?2",
            )?;
            let mut rows = stmt.query([guild.as_str(), user.as_str()])?;
            let mut delay = RoleDelay::empty(guild.clone(), user.clone());
            let mut deletion = BTreeMap::new();
            let mut addition = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let kind: String = row_helpers::get(row, 0, TABLE, "kind")?;
                let role: String = row_helpers::get(row, 1, TABLE, "role_id")?;
                let millis: i64 = row_helpers::get(row, 2, TABLE, "expires_at")?;
                let at = row_helpers::parse_millis(millis, TABLE, "expires_at")?;
                match row_helpers::parse_enum::<DelayKind>(&kind, TABLE, "kind")? {
                    DelayKind::Deletion => deletion.insert(RoleId::from_raw(role), at),
                    DelayKind::Addition => addition.insert(RoleId::from_raw(role), at),
                };
            }
            if deletion.is_empty() && addition.is_empty() {
                return Ok(None);
            }
            delay.deletion_delays = deletion;
            delay.addition_delays = addition;
            Ok(Some(delay))
        })
    }

    /// Apply the net timer changes in one transaction.
    #[instrument(skip(self, update), fields(guild_id = %guild, user_id = %user))]
    pub fn apply(
        &self,
        guild: &GuildId,
        user: &UserId,
        update: &DelayUpdate,
    ) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for kind in [DelayKind::Deletion, DelayKind::Addition] {
                for role in update.unset_for(kind) {
                    tx.execute(
                        "DELETE FROM role_delays
                         WHERE guild_id = ?1 AND user_id = ?2 AND kind = ?3 AND role_id = ?4",
                        rusqlite::params![guild.as_str(), user.as_str(), kind.as_str(), role.as_str()],
                    )?;
                }
                for (role, at) in update.set_for(kind) {
                    tx.execute(
                        "INSERT INTO role_delays (guild_id, user_id, kind, role_id, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT (guild_id, user_id, kind, role_id)
                         DO UPDATE SET expires_at = excluded.expires_at",
                        rusqlite::params![
                            guild.as_str(),
                            user.as_str(),
                            kind.as_str(),
                            role.as_str(),
                            at.timestamp_millis(),
                        ],
                    )?;
                }
            }
            tx.commit()?;
            debug!(
                set = update.set_deletion.len() + update.set_addition.len(),
                unset = update.unset_deletion.len() + update.unset_addition.len(),
                "role delay timers updated"
            );
            Ok(())
        })
    }

    /// `(guild, user)` pairs with at least one timer at or before `now`,
    /// grouped by guild.
    #[instrument(skip(self))]
    pub fn expired(&self, now: DateTime<Utc>) -> Result<BTreeMap<GuildId, Vec<UserId>>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT guild_id, user_id FROM role_delays
                 WHERE expires_at <= ?1
                 ORDER BY guild_id, user_id",
            )?;
            let mut rows = stmt.query([now.timestamp_millis()])?;
            let mut grouped: BTreeMap<GuildId, Vec<UserId>> = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let guild: String = row_helpers::get(row, 0, TABLE, "guild_id")?;
                let user: String = row_helpers::get(row, 1, TABLE, "user_id")?;
                grouped
                    .entry(GuildId::from_raw(guild))
                    .or_default()
                    .push(UserId::from_raw(user));
            }
            Ok(grouped)
        })
    }

    /// Drop every timer for a member.
    pub fn clear(&self, guild: &GuildId, user: &UserId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM role_delays WHERE guild_id = ?1 AND user_id = ?2",
                [guild.as_str(), user.as_str()],
            )?;
            Ok(n)
        })
    }
}
