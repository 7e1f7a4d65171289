use serde::{Deserialize, Serialize};

use crate::ids::{PlayerTag, UserId};

/// A game account linked to a chat user. `order` ranks a user's accounts;
/// the lowest is the default account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub user_id: UserId,
    pub tag: PlayerTag,
    pub verified: bool,
    pub order: i64,
    pub deleted: bool,
}
