//! Settings error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value the engine cannot run with, such as a zero sweep interval.
    #[error("invalid setting {key}: {detail}")]
    InvalidValue { key: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;
