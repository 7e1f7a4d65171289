//! Runs one reconciliation pass over a guild's targeted members.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use rolesync_core::clock::Clock;
use rolesync_core::delay::DelayKind;
use rolesync_core::directory::{GuildInfo, GuildMember, MemberEdit};
use rolesync_core::errors::{DirectoryError, FetchError};
use rolesync_core::game::GamePlayer;
use rolesync_core::ids::{GuildId, PlayerTag, UserId};
use rolesync_core::links::LinkedAccount;
use rolesync_core::roles::RoleSet;
use rolesync_core::sources::{GameClient, GuildSettings, LinkedAccounts, MemberDirectory};
use rolesync_store::RoleDelayRepo;

use crate::changelog::{ChangeLogEntry, RunLog};
use crate::context::{self, RunContext};
use crate::coordinator::{TargetSet, UpdateTarget};
use crate::delay::{self, DelayInput, DelayOutcome};
use crate::error::EngineError;
use crate::nickname::{self, NicknameDecision};
use crate::roles::{self, RoleDecision};
use crate::snapshot::PlayerSnapshot;

pub const DEFAULT_FETCH_CONCURRENCY: usize = 25;
pub const DEFAULT_EDIT_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Live account fetches in flight per run.
    pub fetch_concurrency: usize,
    /// Pause after each directory edit.
    pub edit_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            edit_delay: DEFAULT_EDIT_DELAY,
        }
    }
}

/// Result of fetching one linked account.
enum FetchOutcome {
    Found(GamePlayer),
    Deleted,
    Failed(FetchError),
}

/// Everything decided for one member, before anything is applied.
struct MemberPlan {
    edit: MemberEdit,
    delays: DelayOutcome,
    entry: ChangeLogEntry,
}

/// Collaborators plus the per-guild change logs.
pub struct Reconciler {
    game: Arc<dyn GameClient>,
    directory: Arc<dyn MemberDirectory>,
    links: Arc<dyn LinkedAccounts>,
    settings: Arc<dyn GuildSettings>,
    delays: RoleDelayRepo,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    logs: DashMap<GuildId, RunLog>,
}

impl Reconciler {
    pub fn new(
        game: Arc<dyn GameClient>,
        directory: Arc<dyn MemberDirectory>,
        links: Arc<dyn LinkedAccounts>,
        settings: Arc<dyn GuildSettings>,
        delays: RoleDelayRepo,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            game,
            directory,
            links,
            settings,
            delays,
            clock,
            options,
            logs: DashMap::new(),
        }
    }

    pub fn delays(&self) -> &RoleDelayRepo {
        &self.delays
    }

    pub fn links(&self) -> &Arc<dyn LinkedAccounts> {
        &self.links
    }

    pub fn settings(&self) -> &Arc<dyn GuildSettings> {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Latest run log for `guild`, if any.
    pub fn change_logs(&self, guild: &GuildId) -> Option<RunLog> {
        self.logs.get(guild).map(|log| log.clone())
    }

    pub fn clear_change_logs(&self, guild: &GuildId) -> Option<RunLog> {
        self.logs.remove(guild).map(|(_, log)| log)
    }

    /// Reconcile every member `target` selects. `Ok(None)` when nobody matched.
    #[instrument(skip(self, guild, target), fields(guild_id = %guild))]
    pub async fn run(
        &self,
        guild: &GuildId,
        target: &UpdateTarget,
        force: bool,
        dry_run: bool,
    ) -> Result<Option<RunLog>, EngineError> {
        let ctx = context::assemble(guild, self.settings.as_ref(), self.game.as_ref()).await?;
        let info = match self.directory.guild(guild).await {
            Ok(info) => info,
            Err(DirectoryError::NotFound(_)) => return Err(EngineError::UnknownGuild(guild.clone())),
            Err(e) => return Err(e.into()),
        };

        let (members, departed) = self.target_members(guild, target).await?;
        if !dry_run {
            self.forget_departed(guild, &departed)?;
        }
        if members.is_empty() {
            debug!("no members to reconcile");
            return Ok(None);
        }

        let user_ids: Vec<UserId> = members.iter().map(|m| m.user_id.clone()).collect();
        let accounts = self.accounts_by_user(&user_ids).await?;
        let fetched = self.fetch_players(&accounts).await;

        let started_at = self.clock.now();
        self.logs
            .insert(guild.clone(), RunLog::new(members.len(), started_at));
        info!(members = members.len(), accounts = fetched.len(), "reconciliation started");

        for member in &members {
            let linked = accounts.get(&member.user_id).map(Vec::as_slice).unwrap_or(&[]);
            match snapshots_for(linked, &fetched, &ctx) {
                Ok(players) => {
                    self.reconcile_member(&ctx, &info, member, &players, force, dry_run)
                        .await?;
                }
                Err(e) => {
                    warn!(
                        user_id = %member.user_id,
                        error_kind = e.error_kind(),
                        error = %e,
                        "account fetch failed, skipping member"
                    );
                    self.update_log(guild, |log| log.failed += 1);
                }
            }
            self.update_log(guild, |log| log.progress += 1);
        }

        let finished_at = self.clock.now();
        self.update_log(guild, |log| log.finished_at = Some(finished_at));
        let log = self.change_logs(guild);
        if let Some(log) = &log {
            info!(
                members = log.member_count,
                changed = log.changes.len(),
                failed = log.failed,
                "reconciliation finished"
            );
        }
        Ok(log)
    }

    fn update_log(&self, guild: &GuildId, f: impl FnOnce(&mut RunLog)) {
        if let Some(mut log) = self.logs.get_mut(guild) {
            f(&mut log);
        }
    }

    /// Targeted members, plus targeted user ids no longer in the guild.
    async fn target_members(
        &self,
        guild: &GuildId,
        target: &UpdateTarget,
    ) -> Result<(Vec<GuildMember>, Vec<UserId>), EngineError> {
        let (mut members, departed) = match target {
            UpdateTarget::Members(set) => self.members_for(guild, set).await?,
            UpdateTarget::Role(role) => {
                let mut all = self.directory.members(guild).await?;
                all.retain(|m| m.roles.contains(role));
                (all, Vec::new())
            }
            UpdateTarget::All => (self.directory.members(guild).await?, Vec::new()),
        };
        members.retain(|m| !m.bot);
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok((members, departed))
    }

    /// Timers of users who left can never be consumed by a run.
    fn forget_departed(&self, guild: &GuildId, departed: &[UserId]) -> Result<(), EngineError> {
        for user in departed {
            if self.delays.clear(guild, user)? > 0 {
                debug!(user_id = %user, "cleared delay timers of departed member");
            }
        }
        Ok(())
    }

    async fn members_for(
        &self,
        guild: &GuildId,
        set: &TargetSet,
    ) -> Result<(Vec<GuildMember>, Vec<UserId>), EngineError> {
        let mut users: BTreeSet<UserId> = set.user_ids.clone();
        if !set.player_tags.is_empty() {
            let tags: Vec<PlayerTag> = set.player_tags.iter().cloned().collect();
            let linked = self.links.by_tags(&tags).await?;
            users.extend(linked.into_iter().filter(|l| !l.deleted).map(|l| l.user_id));
        }

        let directory = self.directory.as_ref();
        let found: Vec<(UserId, Option<GuildMember>)> = stream::iter(users)
            .map(|user| async move {
                let member = directory.member(guild, &user).await?;
                Ok::<_, DirectoryError>((user, member))
            })
            .buffer_unordered(self.options.fetch_concurrency.max(1))
            .try_collect()
            .await?;

        let mut members = Vec::with_capacity(found.len());
        let mut departed = Vec::new();
        for (user, member) in found {
            match member {
                Some(member) => members.push(member),
                None => departed.push(user),
            }
        }
        departed.sort();
        Ok((members, departed))
    }

    async fn accounts_by_user(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<LinkedAccount>>, EngineError> {
        let mut accounts = self.links.by_users(users).await?;
        accounts.retain(|a| !a.deleted);
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id).then(a.order.cmp(&b.order)));

        let mut grouped: HashMap<UserId, Vec<LinkedAccount>> = HashMap::new();
        for account in accounts {
            grouped.entry(account.user_id.clone()).or_default().push(account);
        }
        Ok(grouped)
    }

    async fn fetch_players(
        &self,
        accounts: &HashMap<UserId, Vec<LinkedAccount>>,
    ) -> HashMap<PlayerTag, FetchOutcome> {
        let tags: HashSet<PlayerTag> = accounts
            .values()
            .flatten()
            .map(|a| a.tag.clone())
            .collect();
        let game = self.game.as_ref();
        stream::iter(tags)
            .map(|tag| async move {
                let outcome = match game.player(&tag).await {
                    Ok(Some(player)) => FetchOutcome::Found(player),
                    Ok(None) => FetchOutcome::Deleted,
                    Err(e) => FetchOutcome::Failed(e),
                };
                (tag, outcome)
            })
            .buffer_unordered(self.options.fetch_concurrency.max(1))
            .collect()
            .await
    }

    fn plan_member(
        &self,
        ctx: &RunContext,
        info: &GuildInfo,
        member: &GuildMember,
        players: &[PlayerSnapshot],
        force: bool,
    ) -> Result<MemberPlan, EngineError> {
        let config = &ctx.config;
        let resolved = roles::resolve(players, config);
        // Roles the bot cannot manage are dropped before any timer is considered.
        let decision = RoleDecision {
            included: manageable(&resolved.included, info),
            excluded: manageable(&resolved.excluded, info),
        };

        let existing = self.delays.get(&ctx.guild_id, &member.user_id)?;
        let delays = delay::apply_delays(DelayInput {
            decision: &decision,
            current: &member.roles,
            config: &config.delays,
            exempt: &config.delay_exempt_roles(),
            existing: existing.as_ref(),
            now: self.clock.now(),
            force,
        });
        let held = delay::held_roles(&delays, DelayKind::Deletion);
        if !held.is_empty() {
            debug!(user_id = %member.user_id, held = held.len(), "deferred role removals");
        }

        let nickname = nickname::resolve(players, member, info, config);
        let roles = if delays.is_empty() {
            None
        } else {
            Some(member.roles.difference(&delays.remove).union(&delays.add))
        };
        let edit = MemberEdit {
            roles,
            nickname: nickname.to_edit(),
        };

        let entry = ChangeLogEntry {
            user_id: member.user_id.clone(),
            display_name: member
                .nickname
                .clone()
                .unwrap_or_else(|| member.global_name().to_string()),
            included: delays.add.to_vec(),
            excluded: delays.remove.to_vec(),
            nickname: match nickname {
                NicknameDecision::SetName(name) => Some(name),
                NicknameDecision::Unset => Some(member.global_name().to_string()),
                NicknameDecision::Declined(_) | NicknameDecision::NoAction => None,
            },
        };
        Ok(MemberPlan {
            edit,
            delays,
            entry,
        })
    }

    async fn reconcile_member(
        &self,
        ctx: &RunContext,
        info: &GuildInfo,
        member: &GuildMember,
        players: &[PlayerSnapshot],
        force: bool,
        dry_run: bool,
    ) -> Result<(), EngineError> {
        let guild = &ctx.guild_id;
        let plan = self.plan_member(ctx, info, member, players, force)?;

        if dry_run {
            self.update_log(guild, |log| log.record(plan.entry));
            return Ok(());
        }

        if !plan.edit.is_noop() {
            if let Err(e) = self
                .directory
                .edit_member(guild, &member.user_id, &plan.edit)
                .await
            {
                warn!(
                    user_id = %member.user_id,
                    permission = e.is_permission(),
                    error = %e,
                    "member edit failed"
                );
                return Ok(());
            }
        }

        if !plan.delays.update.is_empty() {
            self.delays
                .apply(guild, &member.user_id, &plan.delays.update)?;
        }
        self.update_log(guild, |log| log.record(plan.entry));

        if !plan.edit.is_noop() && !self.options.edit_delay.is_zero() {
            tokio::time::sleep(self.options.edit_delay).await;
        }
        Ok(())
    }
}

fn manageable(roles: &RoleSet, info: &GuildInfo) -> RoleSet {
    roles.iter().filter(|r| info.can_manage_role(r)).cloned().collect()
}

/// Join a member's links with fetched game data. Any failed fetch fails the
/// whole member; deleted accounts are dropped.
fn snapshots_for(
    linked: &[LinkedAccount],
    fetched: &HashMap<PlayerTag, FetchOutcome>,
    ctx: &RunContext,
) -> Result<Vec<PlayerSnapshot>, FetchError> {
    let mut players = Vec::with_capacity(linked.len());
    for account in linked {
        match fetched.get(&account.tag) {
            Some(FetchOutcome::Found(player)) => players.push(PlayerSnapshot::new(
                player.clone(),
                account.verified,
                ctx.war_clans(&account.tag),
            )),
            Some(FetchOutcome::Deleted) => {}
            Some(FetchOutcome::Failed(e)) => return Err(e.clone()),
            None => {
                return Err(FetchError::Transport(format!(
                    "no fetch result for {}",
                    account.tag
                )))
            }
        }
    }
    Ok(players)
}
