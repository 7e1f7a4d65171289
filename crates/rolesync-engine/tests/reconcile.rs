mod common;

use std::time::Duration;

use serde_json::json;

use common::{in_clan, player, Harness, CLAN};
use rolesync_core::directory::{NicknameEdit, NICKNAME_MAX_CHARS};
use rolesync_core::game::{ClanWar, WarState};
use rolesync_core::ids::{ClanTag, GuildId, PlayerTag, RoleId};
use rolesync_core::roles::role_set;
use rolesync_core::settings::SettingKey;
use rolesync_engine::{EngineError, EngineOptions, TargetSet, UpdateOptions, UpdateTarget};

fn all() -> UpdateOptions {
    UpdateOptions::new(UpdateTarget::All)
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let h = Harness::new();
    h.set(SettingKey::AutoNickname, json!(true));
    h.member("u1", &["#P1"]);
    h.game.set_player(in_clan(player("#P1", 15), CLAN, "member"));

    let first = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert_eq!(first.changes.len(), 1);
    assert_eq!(
        h.directory.member_roles("u1"),
        role_set(["member", "th15", "family", "exclusive", "linked"])
    );
    assert_eq!(h.directory.member_nickname("u1").as_deref(), Some("ChiefP1 | HM"));
    let edits = h.directory.edit_count();

    let second = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(h.directory.edit_count(), edits);
}

#[tokio::test]
async fn highest_clan_role_across_accounts_wins() {
    let h = Harness::new();
    h.member("u1", &["#P1", "#P2"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.game.set_player(in_clan(player("#P2", 15), CLAN, "coLeader"));

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    let roles = h.directory.member_roles("u1");
    assert!(roles.contains(&RoleId::from_raw("co")));
    assert!(!roles.contains(&RoleId::from_raw("member")));
    assert!(roles.contains(&RoleId::from_raw("leaders")));
    assert!(roles.contains(&RoleId::from_raw("th14")));
    assert!(roles.contains(&RoleId::from_raw("th15")));
}

#[tokio::test]
async fn exclusive_family_requires_every_account() {
    let h = Harness::new();
    h.member("u1", &["#P1", "#P2", "#P3"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.game.set_player(in_clan(player("#P2", 14), CLAN, "admin"));
    h.game.set_player(in_clan(player("#P3", 14), "#ELSEWHERE", "member"));

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(!h.directory.member_roles("u1").contains(&RoleId::from_raw("exclusive")));

    h.game.set_player(in_clan(player("#P3", 14), CLAN, "member"));
    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(h.directory.member_roles("u1").contains(&RoleId::from_raw("exclusive")));
}

#[tokio::test]
async fn transport_failure_leaves_member_untouched() {
    let h = Harness::new();
    h.member("u1", &["#P1", "#P2"]);
    h.directory.add_member("u1", role_set(["guest", "th14"]));
    h.game.set_player(in_clan(player("#P1", 15), CLAN, "leader"));
    h.game.fail_player(PlayerTag::new("#P2"));

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert_eq!(log.failed, 1);
    assert_eq!(log.progress, 1);
    assert!(log.changes.is_empty());
    assert_eq!(h.directory.edit_count(), 0);
    assert_eq!(h.directory.member_roles("u1"), role_set(["guest", "th14"]));
}

#[tokio::test]
async fn deleted_account_counts_as_absent() {
    let h = Harness::new();
    h.member("u1", &["#P1"]);
    h.directory.add_member("u1", role_set(["family", "linked", "member"]));

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert_eq!(log.failed, 0);
    assert!(h.directory.member_roles("u1").is_empty());
}

#[tokio::test]
async fn unmanaged_roles_are_left_alone() {
    let h = Harness::new();
    h.member("u1", &["#P1"]);
    h.directory.add_member("u1", role_set(["custom", "guest"]));
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    let roles = h.directory.member_roles("u1");
    assert!(roles.contains(&RoleId::from_raw("custom")));
    assert!(!roles.contains(&RoleId::from_raw("guest")));
}

#[tokio::test]
async fn roles_above_the_bot_are_skipped() {
    let h = Harness::new();
    h.directory.set_role_position("family", 1_000);
    h.member("u1", &["#P1"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    let roles = h.directory.member_roles("u1");
    assert!(!roles.contains(&RoleId::from_raw("family")));
    assert!(roles.contains(&RoleId::from_raw("member")));
    assert!(!log.changes[0].included.contains(&RoleId::from_raw("family")));
}

#[tokio::test]
async fn bots_are_never_reconciled() {
    let h = Harness::new();
    h.directory.add_bot("b1");
    h.links
        .link(&h.user("b1"), &PlayerTag::new("#P1"), false)
        .unwrap();
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(log.is_none());
    assert_eq!(h.directory.edit_count(), 0);
}

#[tokio::test]
async fn roles_and_nickname_go_out_in_one_edit() {
    let h = Harness::new();
    h.set(SettingKey::AutoNickname, json!(true));
    h.set(SettingKey::FamilyNicknameFormat, json!("{NAME} | {ALIAS} | {CLAN}"));
    h.member("u1", &["#P1"]);
    let mut p = in_clan(player("#P1", 15), CLAN, "member");
    p.name = "AVeryLongChiefNameForTesting".into();
    h.game.set_player(p);

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    let edits = h.directory.edits();
    assert_eq!(edits.len(), 1);
    let (_, edit) = &edits[0];
    assert!(edit.roles.is_some());
    let NicknameEdit::Set(name) = &edit.nickname else {
        panic!("expected a nickname");
    };
    assert_eq!(name.chars().count(), NICKNAME_MAX_CHARS);
    assert!(name.starts_with("AVeryLongChiefNameForTesting | "));
}

#[tokio::test]
async fn dry_run_reports_without_editing() {
    let h = Harness::new();
    h.set(SettingKey::RoleAdditionDelaySecs, json!(3600));
    h.member("u1", &["#P1"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    let options = UpdateOptions {
        target: UpdateTarget::All,
        force: true,
        dry_run: true,
    };
    let log = h.coordinator.update_many(&h.guild, options).await.unwrap().unwrap();
    assert_eq!(log.changes.len(), 1);
    assert!(log.changes[0].included.contains(&RoleId::from_raw("member")));
    assert_eq!(h.directory.edit_count(), 0);
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn failed_edit_records_nothing() {
    let h = Harness::new();
    h.set(SettingKey::RoleAdditionDelaySecs, json!(60));
    h.member("u1", &["#P1"]);
    h.directory.fail_edits_for("u1");
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert!(log.changes.is_empty());
    assert_eq!(log.progress, 1);
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn war_participants_get_the_war_role() {
    let h = Harness::new();
    h.member("u1", &["#P1"]);
    h.member("u2", &["#P2"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.game.set_player(in_clan(player("#P2", 14), CLAN, "member"));
    h.game.set_wars(
        ClanTag::new(CLAN),
        vec![ClanWar {
            state: WarState::Preparation,
            clan_tag: ClanTag::new(CLAN),
            member_tags: vec![PlayerTag::new("#P1")],
        }],
    );

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(h.directory.member_roles("u1").contains(&RoleId::from_raw("war")));
    assert!(!h.directory.member_roles("u2").contains(&RoleId::from_raw("war")));
}

#[tokio::test]
async fn role_target_only_touches_holders() {
    let h = Harness::new();
    h.member("u1", &["#P1"]);
    h.member("u2", &["#P2"]);
    h.directory.add_member("u2", role_set(["guest"]));
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.game.set_player(in_clan(player("#P2", 14), CLAN, "member"));

    let options = UpdateOptions::new(UpdateTarget::Role(RoleId::from_raw("guest")));
    let log = h.coordinator.update_many(&h.guild, options).await.unwrap().unwrap();
    assert_eq!(log.member_count, 1);
    assert!(h.directory.member_roles("u1").is_empty());
    assert!(h.directory.member_roles("u2").contains(&RoleId::from_raw("family")));
}

#[tokio::test]
async fn members_target_resolves_tags_to_users() {
    let h = Harness::new();
    h.member("u1", &["#P1"]);
    h.member("u2", &["#P2"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.game.set_player(in_clan(player("#P2", 14), CLAN, "member"));

    let target = UpdateTarget::Members(TargetSet::from_tags([PlayerTag::new("#P2")]));
    h.coordinator
        .update_many(&h.guild, UpdateOptions::new(target))
        .await
        .unwrap();
    assert!(h.directory.member_roles("u1").is_empty());
    assert!(!h.directory.member_roles("u2").is_empty());
}

#[tokio::test]
async fn unknown_guild_aborts() {
    let h = Harness::new();
    let err = h
        .coordinator
        .update_many(&GuildId::from_raw("elsewhere"), all())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownGuild(_)));
}

#[tokio::test]
async fn nothing_to_do_returns_none() {
    let h = Harness::new();
    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(log.is_none());
}

#[tokio::test]
async fn fetches_respect_concurrency_cap() {
    let h = Harness::with_options(EngineOptions {
        fetch_concurrency: 5,
        edit_delay: Duration::ZERO,
    });
    h.game.set_latency(Duration::from_millis(20));
    for i in 0..12 {
        let tag = format!("#P{i}");
        h.member(&format!("u{i}"), &[tag.as_str()]);
        h.game.set_player(in_clan(player(&tag, 14), CLAN, "member"));
    }

    let log = h.coordinator.update_many(&h.guild, all()).await.unwrap().unwrap();
    assert_eq!(log.member_count, 12);
    assert_eq!(h.game.player_calls(), 12);
    assert!(h.game.max_in_flight() <= 5);
}
