use rolesync_core::errors::{DirectoryError, FetchError, SourceError};
use rolesync_core::ids::GuildId;
use rolesync_store::StoreError;

/// Failures that abort a whole run for one guild. Per-member problems are
/// logged and counted in the run log instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("game data: {0}")]
    Fetch(#[from] FetchError),

    #[error("source: {0}")]
    Source(#[from] SourceError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown guild: {0}")]
    UnknownGuild(GuildId),

    #[error("coordinator stopped before the run finished")]
    Cancelled,
}
