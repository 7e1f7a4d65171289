/// Failures fetching live game data. A missing (deleted) player is not an
/// error: [`crate::sources::GameClient::player`] returns `Ok(None)` for it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited")]
    RateLimited,
    #[error("game API under maintenance")]
    Maintenance,
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Classify a non-success HTTP status. 404 is handled by callers.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited,
            503 => Self::Maintenance,
            _ => Self::Status { status, body },
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RateLimited => "rate_limited",
            Self::Maintenance => "maintenance",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("missing permission: {0}")]
    MissingPermission(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl DirectoryError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            403 => Self::MissingPermission(body),
            404 => Self::NotFound(body),
            _ => Self::Transport(format!("status {status}: {body}")),
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Self::MissingPermission(_))
    }
}

/// Failures reading the settings or linked-account stores.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SourceError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid value for {key}: {detail}")]
    InvalidValue { key: String, detail: String },
}
