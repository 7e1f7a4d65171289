pub mod clock;
pub mod delay;
pub mod directory;
pub mod errors;
pub mod game;
pub mod ids;
pub mod links;
pub mod roles;
pub mod settings;
pub mod sources;

pub use ids::{ClanTag, GuildId, PlayerTag, RoleId, UserId};
pub use roles::RoleSet;
