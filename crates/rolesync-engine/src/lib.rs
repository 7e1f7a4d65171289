//! Role and nickname reconciliation.
//!
//! A run flows leaf-first through the modules below: [`context`] snapshots
//! the guild's rules, [`roles`] and [`nickname`] compute the desired state,
//! [`delay`] debounces the role diff, and [`executor`] applies it. The
//! [`coordinator`] keeps at most one run per guild in flight and owns the
//! expired-timer sweep.

pub mod changelog;
pub mod context;
pub mod coordinator;
pub mod delay;
pub mod error;
pub mod executor;
pub mod mock;
pub mod nickname;
pub mod roles;
pub mod snapshot;

pub use changelog::{ChangeLogEntry, RunLog};
pub use coordinator::{ClanEvent, Coordinator, EventMember, MemberOp, TargetSet, UpdateOptions, UpdateTarget};
pub use error::EngineError;
pub use executor::{EngineOptions, Reconciler};
