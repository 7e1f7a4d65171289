//! Per-guild run serialization and the expired-timer sweep.
//!
//! Each guild with work in flight has one entry in `queues`. The entry's
//! existence is the "running" marker: whoever inserts it spawns the driver
//! task, and only the driver removes it, atomically with finding the queue
//! empty. Triggers arriving while the entry exists merge into `pending`;
//! manual runs queue behind the active run and await their own result.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use rolesync_core::ids::{ClanTag, GuildId, PlayerTag, RoleId, UserId};

use crate::changelog::RunLog;
use crate::error::EngineError;
use crate::executor::Reconciler;

/// Member operations that can change a member's roles or nickname.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberOp {
    Promoted,
    Demoted,
    Joined,
    Left,
    LeagueChange,
    TownHallUpgrade,
    NameChange,
    War,
    WarRemoved,
    BuilderLeagueChange,
}

impl MemberOp {
    /// Feed tag, e.g. `TOWN_HALL_UPGRADE`. `None` for tags not listed above.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(raw.to_owned())).ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClan {
    pub tag: ClanTag,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMember {
    /// Raw operation tag; unrecognized tags are ignored.
    pub op: String,
    pub tag: PlayerTag,
}

/// A classified game-side change for one clan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanEvent {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub clan: Option<EventClan>,
    #[serde(default)]
    pub members: Vec<EventMember>,
}

impl ClanEvent {
    /// Tags worth reconciling. Events raised mid-war are ignored.
    pub fn affected_tags(&self) -> BTreeSet<PlayerTag> {
        if self.state.as_deref() == Some("inWar") {
            return BTreeSet::new();
        }
        self.members
            .iter()
            .filter(|m| MemberOp::parse(&m.op).is_some())
            .map(|m| m.tag.clone())
            .collect()
    }
}

/// Members to reconcile, by player tag and/or user id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    pub player_tags: BTreeSet<PlayerTag>,
    pub user_ids: BTreeSet<UserId>,
}

impl TargetSet {
    pub fn from_tags(tags: impl IntoIterator<Item = PlayerTag>) -> Self {
        Self {
            player_tags: tags.into_iter().collect(),
            user_ids: BTreeSet::new(),
        }
    }

    pub fn from_users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            player_tags: BTreeSet::new(),
            user_ids: users.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.player_tags.is_empty() && self.user_ids.is_empty()
    }

    pub fn merge(&mut self, other: TargetSet) {
        self.player_tags.extend(other.player_tags);
        self.user_ids.extend(other.user_ids);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateTarget {
    Members(TargetSet),
    /// Every member currently holding the role.
    Role(RoleId),
    All,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateOptions {
    pub target: UpdateTarget,
    /// Skip delay timers and apply every change now.
    pub force: bool,
    /// Compute and log changes without editing anyone.
    pub dry_run: bool,
}

impl UpdateOptions {
    pub fn new(target: UpdateTarget) -> Self {
        Self {
            target,
            force: false,
            dry_run: false,
        }
    }
}

type RunResult = Result<Option<RunLog>, EngineError>;

struct ManualJob {
    options: UpdateOptions,
    reply: oneshot::Sender<RunResult>,
}

#[derive(Default)]
struct GuildQueue {
    pending: TargetSet,
    manual: VecDeque<ManualJob>,
}

enum Job {
    Manual(ManualJob),
    Triggered(TargetSet),
}

#[derive(Clone)]
pub struct Coordinator {
    reconciler: Arc<Reconciler>,
    queues: Arc<DashMap<GuildId, GuildQueue>>,
}

impl Coordinator {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            queues: Arc::new(DashMap::new()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Fire-and-forget trigger for a game event on `clan`.
    #[instrument(skip(self, event), fields(clan_tag = %clan))]
    pub async fn exec(&self, clan: &ClanTag, event: &ClanEvent) -> Result<(), EngineError> {
        let tags = event.affected_tags();
        if tags.is_empty() {
            return Ok(());
        }
        let guilds = self.reconciler.settings().guilds_for_clan(clan).await?;
        for guild in guilds {
            self.trigger(guild, TargetSet::from_tags(tags.iter().cloned()));
        }
        Ok(())
    }

    /// Queue `targets` for `guild`, starting a run if none is active.
    pub fn trigger(&self, guild: GuildId, targets: TargetSet) {
        if targets.is_empty() {
            return;
        }
        self.enqueue(guild, |queue| queue.pending.merge(targets));
    }

    /// Run a manual reconciliation once any active run for the guild is done.
    pub async fn update_many(&self, guild: &GuildId, options: UpdateOptions) -> RunResult {
        let (reply, result) = oneshot::channel();
        self.enqueue(guild.clone(), |queue| {
            queue.manual.push_back(ManualJob { options, reply });
        });
        result.await.map_err(|_| EngineError::Cancelled)?
    }

    /// Reconcile a single user, e.g. right after they link an account.
    pub async fn update_one(&self, user: &UserId, guild: &GuildId) -> RunResult {
        let target = UpdateTarget::Members(TargetSet::from_users([user.clone()]));
        self.update_many(guild, UpdateOptions::new(target)).await
    }

    pub fn is_running(&self, guild: &GuildId) -> bool {
        self.queues.contains_key(guild)
    }

    pub fn change_logs(&self, guild: &GuildId) -> Option<RunLog> {
        self.reconciler.change_logs(guild)
    }

    pub fn clear_change_logs(&self, guild: &GuildId) -> Option<RunLog> {
        self.reconciler.clear_change_logs(guild)
    }

    /// Wait until `guild` has no active or queued run.
    pub async fn wait_idle(&self, guild: &GuildId) {
        while self.is_running(guild) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Trigger every guild holding an expired delay timer. Returns the number
    /// of guilds triggered.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<usize, EngineError> {
        let now = self.reconciler.clock().now();
        let expired = self.reconciler.delays().expired(now)?;
        let mut triggered = 0;
        for (guild, users) in expired {
            let accounts = self.reconciler.links().by_users(&users).await?;
            let targets = TargetSet {
                player_tags: accounts
                    .into_iter()
                    .filter(|a| !a.deleted)
                    .map(|a| a.tag)
                    .collect(),
                user_ids: users.into_iter().collect(),
            };
            debug!(guild_id = %guild, users = targets.user_ids.len(), "expired delay timers");
            self.trigger(guild, targets);
            triggered += 1;
        }
        Ok(triggered)
    }

    /// Run [`Self::sweep_once`] on a fixed interval.
    pub fn spawn_sweep(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match this.sweep_once().await {
                    Ok(0) => {}
                    Ok(guilds) => info!(guilds, "delay sweep triggered runs"),
                    Err(e) => warn!(error = %e, "delay sweep failed"),
                }
            }
        })
    }

    fn enqueue(&self, guild: GuildId, add: impl FnOnce(&mut GuildQueue)) {
        match self.queues.entry(guild.clone()) {
            Entry::Occupied(mut entry) => {
                add(entry.get_mut());
                debug!(guild_id = %guild, "run active, queued");
            }
            Entry::Vacant(entry) => {
                let mut queue = GuildQueue::default();
                add(&mut queue);
                entry.insert(queue);
                let reconciler = Arc::clone(&self.reconciler);
                let queues = Arc::clone(&self.queues);
                tokio::spawn(drive(reconciler, queues, guild));
            }
        }
    }
}

/// Take the next job, or retire the guild's entry when nothing is left.
fn next_job(queues: &DashMap<GuildId, GuildQueue>, guild: &GuildId) -> Option<Job> {
    let Entry::Occupied(mut entry) = queues.entry(guild.clone()) else {
        return None;
    };
    let queue = entry.get_mut();
    if let Some(job) = queue.manual.pop_front() {
        return Some(Job::Manual(job));
    }
    if !queue.pending.is_empty() {
        return Some(Job::Triggered(std::mem::take(&mut queue.pending)));
    }
    entry.remove();
    None
}

async fn drive(
    reconciler: Arc<Reconciler>,
    queues: Arc<DashMap<GuildId, GuildQueue>>,
    guild: GuildId,
) {
    while let Some(job) = next_job(&queues, &guild) {
        match job {
            Job::Manual(job) => {
                let result = run_isolated(&reconciler, &guild, job.options).await;
                // The caller may have stopped waiting.
                let _ = job.reply.send(result);
            }
            Job::Triggered(targets) => {
                let options = UpdateOptions::new(UpdateTarget::Members(targets));
                if let Err(e) = run_isolated(&reconciler, &guild, options).await {
                    warn!(guild_id = %guild, error = %e, "triggered run failed");
                }
            }
        }
    }
    debug!(guild_id = %guild, "guild idle");
}

/// Run on its own task so a panic cannot strand the guild's queue entry.
async fn run_isolated(
    reconciler: &Arc<Reconciler>,
    guild: &GuildId,
    options: UpdateOptions,
) -> RunResult {
    let reconciler = Arc::clone(reconciler);
    let guild = guild.clone();
    tokio::spawn(async move {
        reconciler
            .run(&guild, &options.target, options.force, options.dry_run)
            .await
    })
    .await
    .map_err(|_| EngineError::Cancelled)?
}
