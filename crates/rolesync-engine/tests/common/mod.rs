#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use rolesync_core::clock::ManualClock;
use rolesync_core::game::{GamePlayer, PlayerClan};
use rolesync_core::ids::{ClanTag, GuildId, PlayerTag, UserId};
use rolesync_core::settings::SettingKey;
use rolesync_engine::mock::{MockDirectory, MockGameClient};
use rolesync_engine::{Coordinator, EngineOptions, Reconciler};
use rolesync_store::{Database, LinkRepo, RoleDelayRepo, SettingsRepo};

pub const GUILD: &str = "guild-1";
pub const CLAN: &str = "#CLAN1";

/// Every role the default guild configuration manages.
pub const ROLES: &[&str] = &[
    "member", "elder", "co", "leader", "everyone", "war", "th14", "th15", "family", "guest",
    "exclusive", "verified", "linked", "leaders",
];

pub struct Harness {
    pub guild: GuildId,
    pub game: Arc<MockGameClient>,
    pub directory: Arc<MockDirectory>,
    pub links: LinkRepo,
    pub settings: SettingsRepo,
    pub delays: RoleDelayRepo,
    pub clock: ManualClock,
    pub coordinator: Coordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(EngineOptions {
            fetch_concurrency: 25,
            edit_delay: Duration::ZERO,
        })
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let db = Database::in_memory().unwrap();
        let guild = GuildId::from_raw(GUILD);
        let game = Arc::new(MockGameClient::new());
        let directory = Arc::new(MockDirectory::new(guild.clone(), ROLES));
        let links = LinkRepo::new(db.clone());
        let settings = SettingsRepo::new(db.clone());
        let delays = RoleDelayRepo::new(db);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());

        let reconciler = Reconciler::new(
            game.clone(),
            directory.clone(),
            Arc::new(links.clone()),
            Arc::new(settings.clone()),
            delays.clone(),
            Arc::new(clock.clone()),
            options,
        );
        let harness = Self {
            guild,
            game,
            directory,
            links,
            settings,
            delays,
            clock,
            coordinator: Coordinator::new(reconciler),
        };
        harness.configure_default();
        harness
    }

    fn configure_default(&self) {
        self.set(
            SettingKey::Clans,
            json!([{
                "tag": CLAN,
                "name": "Home",
                "alias": "HM",
                "order": 1,
                "roles": {
                    "member": "member",
                    "admin": "elder",
                    "co_leader": "co",
                    "leader": "leader",
                    "everyone": "everyone",
                    "war": "war"
                }
            }]),
        );
        self.set(SettingKey::TownHallRoles, json!({"14": "th14", "15": "th15"}));
        self.set(SettingKey::FamilyRole, json!("family"));
        self.set(SettingKey::GuestRole, json!("guest"));
        self.set(SettingKey::ExclusiveFamilyRole, json!("exclusive"));
        self.set(SettingKey::VerifiedRole, json!("verified"));
        self.set(SettingKey::AccountLinkedRole, json!("linked"));
        self.set(SettingKey::FamilyLeaderRoles, json!(["leaders"]));
    }

    pub fn set(&self, key: SettingKey, value: Value) {
        self.settings.set(&self.guild, key, &value).unwrap();
    }

    /// Add a guild member with `tags` linked in order.
    pub fn member(&self, user: &str, tags: &[&str]) {
        self.directory.add_member(user, Default::default());
        for tag in tags {
            self.links
                .link(&UserId::from_raw(user), &PlayerTag::new(tag), false)
                .unwrap();
        }
    }

    pub fn user(&self, user: &str) -> UserId {
        UserId::from_raw(user)
    }
}

pub fn player(tag: &str, town_hall: u32) -> GamePlayer {
    GamePlayer {
        tag: PlayerTag::new(tag),
        name: format!("Chief{}", tag.trim_start_matches('#')),
        town_hall_level: town_hall,
        town_hall_weapon_level: None,
        builder_hall_level: None,
        trophies: 1_000,
        league_id: None,
        builder_league_id: None,
        clan: None,
        role: None,
        hero_levels: Vec::new(),
    }
}

pub fn in_clan(mut player: GamePlayer, clan: &str, role: &str) -> GamePlayer {
    player.clan = Some(PlayerClan {
        tag: ClanTag::new(clan),
        name: "Home".into(),
    });
    player.role = Some(role.into());
    player
}
