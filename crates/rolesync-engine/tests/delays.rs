mod common;

use chrono::Duration;
use serde_json::json;

use common::{in_clan, player, Harness, CLAN};
use rolesync_core::ids::{PlayerTag, RoleId};
use rolesync_core::roles::role_set;
use rolesync_core::settings::SettingKey;
use rolesync_engine::{UpdateOptions, UpdateTarget};

fn all() -> UpdateOptions {
    UpdateOptions::new(UpdateTarget::All)
}

/// A family member who then leaves the tracked clan, with a 10 minute
/// removal delay.
async fn member_who_left(h: &Harness) {
    h.set(SettingKey::RoleRemovalDelaySecs, json!(600));
    h.member("u1", &["#P1"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    assert!(h.directory.member_roles("u1").contains(&RoleId::from_raw("family")));

    h.game.set_player(player("#P1", 14));
    h.coordinator.update_many(&h.guild, all()).await.unwrap();
}

#[tokio::test]
async fn removal_waits_for_delay_then_sweep_applies_it() {
    let h = Harness::new();
    member_who_left(&h).await;

    // Held: still a family member, timer pending. Guest applies immediately.
    let roles = h.directory.member_roles("u1");
    assert!(roles.contains(&RoleId::from_raw("family")));
    assert!(roles.contains(&RoleId::from_raw("guest")));
    let row = h.delays.get(&h.guild, &h.user("u1")).unwrap().unwrap();
    assert!(row.deletion_delays.contains_key(&RoleId::from_raw("family")));

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 0);
    assert!(h.directory.member_roles("u1").contains(&RoleId::from_raw("family")));

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 1);
    h.coordinator.wait_idle(&h.guild).await;

    let roles = h.directory.member_roles("u1");
    assert!(!roles.contains(&RoleId::from_raw("family")));
    assert!(!roles.contains(&RoleId::from_raw("member")));
    assert_eq!(roles, role_set(["guest", "linked"]));
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn departed_member_timers_are_cleared_by_the_sweep() {
    let h = Harness::new();
    member_who_left(&h).await;
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_some());

    h.directory.remove_member("u1");
    h.clock.advance(Duration::minutes(10));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 1);
    h.coordinator.wait_idle(&h.guild).await;

    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 0);
}

#[tokio::test]
async fn dry_run_keeps_departed_member_timers() {
    let h = Harness::new();
    member_who_left(&h).await;
    h.directory.remove_member("u1");

    let mut options = UpdateOptions::new(UpdateTarget::Members(
        rolesync_engine::TargetSet::from_users([h.user("u1")]),
    ));
    options.dry_run = true;
    assert!(h.coordinator.update_many(&h.guild, options).await.unwrap().is_none());
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_some());
}

#[tokio::test]
async fn returning_before_expiry_cancels_removal() {
    let h = Harness::new();
    member_who_left(&h).await;

    h.clock.advance(Duration::minutes(3));
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));
    h.coordinator.update_many(&h.guild, all()).await.unwrap();

    // The family timers are cancelled; the guest role now waits its own turn.
    let row = h.delays.get(&h.guild, &h.user("u1")).unwrap().unwrap();
    let pending: Vec<_> = row.deletion_delays.keys().cloned().collect();
    assert_eq!(pending, vec![RoleId::from_raw("guest")]);
    assert!(h.directory.member_roles("u1").contains(&RoleId::from_raw("family")));

    h.clock.advance(Duration::minutes(30));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 1);
    h.coordinator.wait_idle(&h.guild).await;

    let roles = h.directory.member_roles("u1");
    assert!(roles.contains(&RoleId::from_raw("family")));
    assert!(!roles.contains(&RoleId::from_raw("guest")));
    for (_, edit) in h.directory.edits() {
        if let Some(roles) = edit.roles {
            assert!(roles.contains(&RoleId::from_raw("family")));
        }
    }
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn additions_wait_symmetrically() {
    let h = Harness::new();
    h.set(SettingKey::RoleAdditionDelaySecs, json!(120));
    h.member("u1", &["#P1"]);
    h.game.set_player(in_clan(player("#P1", 14), CLAN, "member"));

    h.coordinator.update_many(&h.guild, all()).await.unwrap();
    // Only the delay-exempt linked role lands right away.
    assert_eq!(h.directory.member_roles("u1"), role_set(["linked"]));

    h.clock.advance(Duration::minutes(2));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 1);
    h.coordinator.wait_idle(&h.guild).await;
    assert_eq!(
        h.directory.member_roles("u1"),
        role_set(["member", "th14", "family", "exclusive", "linked"])
    );
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn forced_run_ignores_and_clears_timers() {
    let h = Harness::new();
    member_who_left(&h).await;
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_some());

    let options = UpdateOptions {
        target: UpdateTarget::All,
        force: true,
        dry_run: false,
    };
    h.coordinator.update_many(&h.guild, options).await.unwrap();
    assert!(!h.directory.member_roles("u1").contains(&RoleId::from_raw("family")));
    assert!(h.delays.get(&h.guild, &h.user("u1")).unwrap().is_none());
}

#[tokio::test]
async fn sweep_revisits_users_whose_links_vanished() {
    let h = Harness::new();
    member_who_left(&h).await;
    h.links.unlink(&h.user("u1"), &PlayerTag::new("#P1")).unwrap();

    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.coordinator.sweep_once().await.unwrap(), 1);
    h.coordinator.wait_idle(&h.guild).await;

    // Expired removals and the exempt linked role apply; guest starts its own timer.
    assert_eq!(h.directory.member_roles("u1"), role_set(["guest"]));
    let row = h.delays.get(&h.guild, &h.user("u1")).unwrap().unwrap();
    assert_eq!(row.deletion_delays.len(), 1);
    assert!(row.deletion_delays.contains_key(&RoleId::from_raw("guest")));
}
