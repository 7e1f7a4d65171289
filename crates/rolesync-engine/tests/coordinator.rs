mod common;

use std::time::Duration;

use serde_json::json;

use common::{in_clan, player, Harness, CLAN};
use rolesync_core::ids::{ClanTag, PlayerTag, RoleId};
use rolesync_core::settings::SettingKey;
use rolesync_engine::{ClanEvent, EventMember, UpdateOptions, UpdateTarget};

fn event(op: &str, tags: &[&str]) -> ClanEvent {
    ClanEvent {
        state: None,
        clan: None,
        members: tags
            .iter()
            .map(|t| EventMember {
                op: op.to_string(),
                tag: PlayerTag::new(t),
            })
            .collect(),
    }
}

fn family_members(h: &Harness, count: usize) {
    for i in 1..=count {
        let tag = format!("#P{i}");
        h.member(&format!("u{i}"), &[tag.as_str()]);
        h.game.set_player(in_clan(player(&tag, 14), CLAN, "member"));
    }
}

fn has_family(h: &Harness, user: &str) -> bool {
    h.directory.member_roles(user).contains(&RoleId::from_raw("family"))
}

#[tokio::test]
async fn triggers_during_a_run_merge_into_one_follow_up() {
    let h = Harness::new();
    family_members(&h, 3);
    h.directory.set_edit_latency(Duration::from_millis(200));
    let clan = ClanTag::new(CLAN);

    h.coordinator.exec(&clan, &event("JOINED", &["#P1"])).await.unwrap();
    assert!(h.coordinator.is_running(&h.guild));
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.coordinator.exec(&clan, &event("PROMOTED", &["#P2"])).await.unwrap();
    h.coordinator.exec(&clan, &event("LEAGUE_CHANGE", &["#P3"])).await.unwrap();
    assert!(h.coordinator.is_running(&h.guild));

    h.coordinator.wait_idle(&h.guild).await;
    assert!(!h.coordinator.is_running(&h.guild));
    for user in ["u1", "u2", "u3"] {
        assert!(has_family(&h, user), "{user}");
    }
    let last = h.coordinator.change_logs(&h.guild).unwrap();
    assert_eq!(last.member_count, 2);
    assert!(last.finished_at.is_some());
}

#[tokio::test]
async fn in_war_events_do_not_trigger() {
    let h = Harness::new();
    family_members(&h, 1);
    let mut ev = event("PROMOTED", &["#P1"]);
    ev.state = Some("inWar".into());

    h.coordinator.exec(&ClanTag::new(CLAN), &ev).await.unwrap();
    assert!(!h.coordinator.is_running(&h.guild));
    assert_eq!(h.directory.edit_count(), 0);
}

#[tokio::test]
async fn unrecognized_ops_and_untracked_clans_are_ignored() {
    let h = Harness::new();
    family_members(&h, 1);

    h.coordinator
        .exec(&ClanTag::new(CLAN), &event("DONATED", &["#P1"]))
        .await
        .unwrap();
    h.coordinator
        .exec(&ClanTag::new("#ELSEWHERE"), &event("JOINED", &["#P1"]))
        .await
        .unwrap();
    assert!(!h.coordinator.is_running(&h.guild));
    assert_eq!(h.directory.edit_count(), 0);
}

#[tokio::test]
async fn manual_run_waits_for_active_run() {
    let h = Harness::new();
    family_members(&h, 2);
    h.directory.set_edit_latency(Duration::from_millis(100));

    h.coordinator
        .exec(&ClanTag::new(CLAN), &event("JOINED", &["#P1"]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let log = h
        .coordinator
        .update_one(&h.user("u2"), &h.guild)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.member_count, 1);

    let order: Vec<String> = h
        .directory
        .edits()
        .into_iter()
        .map(|(user, _)| user.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["u1", "u2"]);
}

#[tokio::test]
async fn change_logs_are_cleared_after_reading() {
    let h = Harness::new();
    family_members(&h, 1);
    assert!(h.coordinator.change_logs(&h.guild).is_none());

    h.coordinator
        .update_many(&h.guild, UpdateOptions::new(UpdateTarget::All))
        .await
        .unwrap();
    let log = h.coordinator.clear_change_logs(&h.guild).unwrap();
    assert_eq!(log.changes.len(), 1);
    assert_eq!(log.changes[0].user_id, h.user("u1"));
    assert!(h.coordinator.change_logs(&h.guild).is_none());
}

#[tokio::test]
async fn background_sweep_converges_without_events() {
    let h = Harness::new();
    h.set(SettingKey::RoleAdditionDelaySecs, json!(60));
    family_members(&h, 1);
    h.coordinator
        .update_many(&h.guild, UpdateOptions::new(UpdateTarget::All))
        .await
        .unwrap();
    assert!(!has_family(&h, "u1"));

    h.clock.advance(chrono::Duration::seconds(61));
    let sweep = h.coordinator.spawn_sweep(Duration::from_millis(10));
    for _ in 0..200 {
        if has_family(&h, "u1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sweep.abort();
    assert!(has_family(&h, "u1"));
}
