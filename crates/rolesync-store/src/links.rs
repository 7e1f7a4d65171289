//! Linked game accounts. Unlinking is a soft delete; lookups never return
//! deleted links.

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use rolesync_core::errors::SourceError;
use rolesync_core::ids::{PlayerTag, UserId};
use rolesync_core::links::LinkedAccount;
use rolesync_core::sources::LinkedAccounts;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "linked_accounts";
const COLUMNS: &str = "user_id, tag, verified, sort_order, deleted";
/// Bound parameters per `IN (...)` query; SQLite rejects more than 32766.
const MAX_IN_PARAMS: usize = 10_000;

#[derive(Clone)]
pub struct LinkRepo {
    db: Database,
}

impl LinkRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Link `tag` to `user`, placed after the user's existing accounts.
    /// Relinking a tag moves it to the new owner and revives it.
    #[instrument(skip(self), fields(user_id = %user, tag = %tag))]
    pub fn link(
        &self,
        user: &UserId,
        tag: &PlayerTag,
        verified: bool,
    ) -> Result<LinkedAccount, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let next_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM linked_accounts
                 WHERE user_id = ?1 AND deleted = 0",
                [user.as_str()],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO linked_accounts (tag, user_id, verified, sort_order, deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)
                 ON CONFLICT (tag) DO UPDATE SET
                    user_id = excluded.user_id,
                    verified = excluded.verified,
                    sort_order = excluded.sort_order,
                    deleted = 0",
                rusqlite::params![tag.as_str(), user.as_str(), verified, next_order, now],
            )?;
            Ok(LinkedAccount {
                user_id: user.clone(),
                tag: tag.clone(),
                verified,
                order: next_order,
                deleted: false,
            })
        })
    }

    /// Soft-delete a link. Returns false when no live link existed.
    #[instrument(skip(self), fields(user_id = %user, tag = %tag))]
    pub fn unlink(&self, user: &UserId, tag: &PlayerTag) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE linked_accounts SET deleted = 1
                 WHERE user_id = ?1 AND tag = ?2 AND deleted = 0",
                [user.as_str(), tag.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_verified(&self, tag: &PlayerTag, verified: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE linked_accounts SET verified = ?1 WHERE tag = ?2 AND deleted = 0",
                rusqlite::params![verified, tag.as_str()],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(format!("linked account {tag}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self, users), fields(count = users.len()))]
    pub fn by_users(&self, users: &[UserId]) -> Result<Vec<LinkedAccount>, StoreError> {
        let ids: Vec<&str> = users.iter().map(UserId::as_str).collect();
        self.select_in("user_id", &ids)
    }

    #[instrument(skip(self, tags), fields(count = tags.len()))]
    pub fn by_tags(&self, tags: &[PlayerTag]) -> Result<Vec<LinkedAccount>, StoreError> {
        let ids: Vec<&str> = tags.iter().map(PlayerTag::as_str).collect();
        self.select_in("tag", &ids)
    }

    fn select_in(&self, column: &str, values: &[&str]) -> Result<Vec<LinkedAccount>, StoreError> {
        let mut values = values.to_vec();
        values.sort_unstable();
        values.dedup();

        let mut out = Vec::new();
        self.db.with_conn(|conn| {
            for chunk in values.chunks(MAX_IN_PARAMS) {
                let sql = format!(
                    "SELECT {COLUMNS} FROM linked_accounts
                     WHERE deleted = 0 AND {column} IN ({})",
                    row_helpers::placeholders(1, chunk.len())
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let mut rows = stmt.query(rusqlite::params_from_iter(chunk.iter()))?;
                while let Some(row) = rows.next()? {
                    out.push(row_to_account(row)?);
                }
            }
            Ok(())
        })?;
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id).then(a.order.cmp(&b.order)));
        Ok(out)
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> Result<LinkedAccount, StoreError> {
    let user: String = row_helpers::get(row, 0, TABLE, "user_id")?;
    let tag: String = row_helpers::get(row, 1, TABLE, "tag")?;
    Ok(LinkedAccount {
        user_id: UserId::from_raw(user),
        tag: PlayerTag::new(&tag),
        verified: row_helpers::get(row, 2, TABLE, "verified")?,
        order: row_helpers::get(row, 3, TABLE, "sort_order")?,
        deleted: row_helpers::get(row, 4, TABLE, "deleted")?,
    })
}

#[async_trait]
impl LinkedAccounts for LinkRepo {
    async fn by_users(&self, users: &[UserId]) -> Result<Vec<LinkedAccount>, SourceError> {
        Ok(LinkRepo::by_users(self, users)?)
    }

    async fn by_tags(&self, tags: &[PlayerTag]) -> Result<Vec<LinkedAccount>, SourceError> {
        Ok(LinkRepo::by_tags(self, tags)?)
    }
}
