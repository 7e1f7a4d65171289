//! Set algebra over role identifiers.
//!
//! Every role universe the engine reasons about (targeted, included,
//! excluded, held) is a `RoleSet`, so `targeted = included ∪ excluded`
//! holds by construction instead of by careful array concatenation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::RoleId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<RoleId>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, role: RoleId) -> bool {
        self.0.insert(role)
    }

    /// Insert when present; config lookups yield `Option<&RoleId>`.
    pub fn insert_opt(&mut self, role: Option<&RoleId>) {
        if let Some(role) = role {
            self.0.insert(role.clone());
        }
    }

    pub fn remove(&mut self, role: &RoleId) -> bool {
        self.0.remove(role)
    }

    pub fn contains(&self, role: &RoleId) -> bool {
        self.0.contains(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleId> {
        self.0.iter()
    }

    pub fn union(&self, other: &RoleSet) -> RoleSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn difference(&self, other: &RoleSet) -> RoleSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &RoleSet) -> RoleSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn extend(&mut self, other: &RoleSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&RoleId) -> bool) {
        self.0.retain(|r| keep(r));
    }

    pub fn to_vec(&self) -> Vec<RoleId> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<RoleId> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a RoleId> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a RoleId>>(iter: I) -> Self {
        Self(iter.into_iter().cloned().collect())
    }
}

impl IntoIterator for RoleSet {
    type Item = RoleId;
    type IntoIter = std::collections::btree_set::IntoIter<RoleId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = &'a RoleId;
    type IntoIter = std::collections::btree_set::Iter<'a, RoleId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Shorthand for building role sets in tests and fixtures.
pub fn role_set<I, S>(ids: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(|s| RoleId::from_raw(s)).collect()
}
