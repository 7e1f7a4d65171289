//! Debouncing of role changes through persisted per-role timers.
//!
//! Given the resolver's decision and the member's current roles, work out
//! which additions and removals apply now, and the net timer changes to
//! persist. Timers are only ever set for roles with a pending change, and are
//! cleared as soon as the change applies or stops being pending.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use rolesync_core::delay::{DelayKind, DelayUpdate, RoleDelay};
use rolesync_core::ids::RoleId;
use rolesync_core::roles::RoleSet;

use crate::context::DelayConfig;
use crate::roles::RoleDecision;

/// What to change this run, plus the timer bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DelayOutcome {
    pub add: RoleSet,
    pub remove: RoleSet,
    pub update: DelayUpdate,
}

impl DelayOutcome {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub struct DelayInput<'a> {
    pub decision: &'a RoleDecision,
    pub current: &'a RoleSet,
    pub config: &'a DelayConfig,
    pub exempt: &'a RoleSet,
    pub existing: Option<&'a RoleDelay>,
    pub now: DateTime<Utc>,
    /// Apply everything immediately and drop all timers.
    pub force: bool,
}

pub fn apply_delays(input: DelayInput<'_>) -> DelayOutcome {
    let to_add = input.decision.included.difference(input.current);
    let to_remove = input.decision.excluded.intersection(input.current);
    let immediate = input.force || input.config.is_disabled();
    let empty = BTreeMap::new();

    let mut update = DelayUpdate::default();
    let mut direction = |kind: DelayKind, pending: &RoleSet, delay: Duration| {
        let timers = input.existing.map_or(&empty, |d| d.timers(kind));
        let applies_now = immediate || delay <= Duration::zero();
        let mut apply = RoleSet::new();
        for role in pending.iter() {
            if applies_now || input.exempt.contains(role) {
                apply.insert(role.clone());
                continue;
            }
            match timers.get(role) {
                None => update.set(kind, role.clone(), input.now + delay),
                Some(expiry) if *expiry <= input.now => {
                    apply.insert(role.clone());
                }
                Some(_) => {}
            }
        }
        for role in timers.keys() {
            if !pending.contains(role) || apply.contains(role) {
                update.unset(kind, role.clone());
            }
        }
        apply
    };

    let remove = direction(DelayKind::Deletion, &to_remove, input.config.deletion);
    let add = direction(DelayKind::Addition, &to_add, input.config.addition);
    DelayOutcome { add, remove, update }
}

/// Roles whose timers are still running after `outcome` is persisted.
pub fn held_roles(outcome: &DelayOutcome, kind: DelayKind) -> Vec<RoleId> {
    outcome.update.set_for(kind).keys().cloned().collect()
}
