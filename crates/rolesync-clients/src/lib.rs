pub mod discord;
pub mod game;

pub use discord::DiscordDirectory;
pub use game::GameApiClient;
