//! In-process collaborators for deterministic tests without network access.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rolesync_core::directory::{
    BotPermissions, GuildInfo, GuildMember, MemberEdit, NicknameEdit,
};
use rolesync_core::errors::{DirectoryError, FetchError};
use rolesync_core::game::{ClanWar, GamePlayer};
use rolesync_core::ids::{ClanTag, GuildId, PlayerTag, RoleId, UserId};
use rolesync_core::roles::RoleSet;
use rolesync_core::sources::{GameClient, MemberDirectory};

/// Game client serving programmed players and wars. Unknown tags are
/// reported as deleted.
#[derive(Default)]
pub struct MockGameClient {
    players: Mutex<HashMap<PlayerTag, GamePlayer>>,
    failing: Mutex<HashSet<PlayerTag>>,
    wars: Mutex<HashMap<ClanTag, Vec<ClanWar>>>,
    failing_wars: Mutex<HashSet<ClanTag>>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGameClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_player(&self, player: GamePlayer) {
        self.failing.lock().remove(&player.tag);
        self.players.lock().insert(player.tag.clone(), player);
    }

    pub fn remove_player(&self, tag: &PlayerTag) {
        self.players.lock().remove(tag);
    }

    /// Make fetches of `tag` fail with a transport error.
    pub fn fail_player(&self, tag: PlayerTag) {
        self.failing.lock().insert(tag);
    }

    pub fn set_wars(&self, clan: ClanTag, wars: Vec<ClanWar>) {
        self.wars.lock().insert(clan, wars);
    }

    pub fn fail_wars(&self, clan: ClanTag) {
        self.failing_wars.lock().insert(clan);
    }

    /// Delay every player fetch, so concurrent fetches overlap.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn player_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameClient for MockGameClient {
    async fn player(&self, tag: &PlayerTag) -> Result<Option<GamePlayer>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = if self.failing.lock().contains(tag) {
            Err(FetchError::Transport(format!("connection reset fetching {tag}")))
        } else {
            Ok(self.players.lock().get(tag).cloned())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn current_wars(&self, clan: &ClanTag) -> Result<Vec<ClanWar>, FetchError> {
        if self.failing_wars.lock().contains(clan) {
            return Err(FetchError::Maintenance);
        }
        Ok(self.wars.lock().get(clan).cloned().unwrap_or_default())
    }
}

/// One-guild directory that applies edits to its own member table, so
/// consecutive runs observe earlier edits.
pub struct MockDirectory {
    guild: Mutex<GuildInfo>,
    members: Mutex<BTreeMap<UserId, GuildMember>>,
    edits: Mutex<Vec<(UserId, MemberEdit)>>,
    failing_edits: Mutex<HashSet<UserId>>,
    edit_latency: Mutex<Option<Duration>>,
}

impl MockDirectory {
    /// A guild where the bot may manage every role in `roles`, positioned
    /// below it in the given order.
    pub fn new(guild: GuildId, roles: &[&str]) -> Self {
        let role_positions = roles
            .iter()
            .enumerate()
            .map(|(i, r)| (RoleId::from_raw(*r), i as i64 + 1))
            .collect();
        Self {
            guild: Mutex::new(GuildInfo {
                id: guild,
                owner_id: UserId::from_raw("owner"),
                bot: BotPermissions {
                    manage_roles: true,
                    manage_nicknames: true,
                    highest_role_position: roles.len() as i64 + 1,
                },
                role_positions,
            }),
            members: Mutex::new(BTreeMap::new()),
            edits: Mutex::new(Vec::new()),
            failing_edits: Mutex::new(HashSet::new()),
            edit_latency: Mutex::new(None),
        }
    }

    pub fn add_member(&self, user: &str, roles: RoleSet) {
        let member = GuildMember {
            user_id: UserId::from_raw(user),
            username: format!("{user}_name"),
            display_name: None,
            nickname: None,
            roles,
            bot: false,
        };
        self.members.lock().insert(member.user_id.clone(), member);
    }

    pub fn add_bot(&self, user: &str) {
        self.add_member(user, RoleSet::new());
        if let Some(m) = self.members.lock().get_mut(&UserId::from_raw(user)) {
            m.bot = true;
        }
    }

    pub fn remove_member(&self, user: &str) {
        self.members.lock().remove(&UserId::from_raw(user));
    }

    pub fn set_role_position(&self, role: &str, position: i64) {
        self.guild
            .lock()
            .role_positions
            .insert(RoleId::from_raw(role), position);
    }

    pub fn set_bot(&self, bot: BotPermissions) {
        self.guild.lock().bot = bot;
    }

    pub fn fail_edits_for(&self, user: &str) {
        self.failing_edits.lock().insert(UserId::from_raw(user));
    }

    pub fn set_edit_latency(&self, latency: Duration) {
        *self.edit_latency.lock() = Some(latency);
    }

    pub fn member_roles(&self, user: &str) -> RoleSet {
        self.members
            .lock()
            .get(&UserId::from_raw(user))
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    pub fn member_nickname(&self, user: &str) -> Option<String> {
        self.members
            .lock()
            .get(&UserId::from_raw(user))
            .and_then(|m| m.nickname.clone())
    }

    pub fn edits(&self) -> Vec<(UserId, MemberEdit)> {
        self.edits.lock().clone()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().len()
    }
}

#[async_trait]
impl MemberDirectory for MockDirectory {
    async fn guild(&self, guild: &GuildId) -> Result<GuildInfo, DirectoryError> {
        let info = self.guild.lock().clone();
        if &info.id != guild {
            return Err(DirectoryError::NotFound(format!("guild {guild}")));
        }
        Ok(info)
    }

    async fn members(&self, _guild: &GuildId) -> Result<Vec<GuildMember>, DirectoryError> {
        Ok(self.members.lock().values().cloned().collect())
    }

    async fn member(
        &self,
        _guild: &GuildId,
        user: &UserId,
    ) -> Result<Option<GuildMember>, DirectoryError> {
        Ok(self.members.lock().get(user).cloned())
    }

    async fn edit_member(
        &self,
        _guild: &GuildId,
        user: &UserId,
        edit: &MemberEdit,
    ) -> Result<(), DirectoryError> {
        let latency = *self.edit_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_edits.lock().contains(user) {
            return Err(DirectoryError::MissingPermission("Missing Permissions".into()));
        }
        self.edits.lock().push((user.clone(), edit.clone()));
        let mut members = self.members.lock();
        let member = members
            .get_mut(user)
            .ok_or_else(|| DirectoryError::NotFound(format!("member {user}")))?;
        if let Some(roles) = &edit.roles {
            member.roles = roles.clone();
        }
        match &edit.nickname {
            NicknameEdit::Keep => {}
            NicknameEdit::Clear => member.nickname = None,
            NicknameEdit::Set(name) => member.nickname = Some(name.clone()),
        }
        Ok(())
    }
}
