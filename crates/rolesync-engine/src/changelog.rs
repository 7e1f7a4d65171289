//! Audit trail of what each run changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolesync_core::ids::{RoleId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub user_id: UserId,
    pub display_name: String,
    /// Roles added this run.
    pub included: Vec<RoleId>,
    /// Roles removed this run.
    pub excluded: Vec<RoleId>,
    /// Name shown after the edit, when the nickname changed.
    pub nickname: Option<String>,
}

impl ChangeLogEntry {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty() && self.nickname.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    pub member_count: usize,
    /// Members processed so far, including skipped ones.
    pub progress: usize,
    /// Members skipped because an account could not be fetched.
    pub failed: usize,
    pub changes: Vec<ChangeLogEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunLog {
    pub fn new(member_count: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            member_count,
            progress: 0,
            failed: 0,
            changes: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn record(&mut self, entry: ChangeLogEntry) {
        if !entry.is_empty() {
            self.changes.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entries_are_not_recorded() {
        let mut log = RunLog::new(2, Utc::now());
        log.record(ChangeLogEntry {
            user_id: UserId::from_raw("1"),
            display_name: "a".into(),
            included: vec![],
            excluded: vec![],
            nickname: None,
        });
        log.record(ChangeLogEntry {
            user_id: UserId::from_raw("2"),
            display_name: "b".into(),
            included: vec![RoleId::from_raw("r")],
            excluded: vec![],
            nickname: None,
        });
        assert_eq!(log.changes.len(), 1);
        assert!(log.finished_at.is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let log = RunLog::new(0, Utc::now());
        let value = serde_json::to_value(&log).unwrap();
        assert!(value.get("memberCount").is_some());
        assert!(value.get("finishedAt").is_some());
    }
}
