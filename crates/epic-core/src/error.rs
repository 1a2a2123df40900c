//! Error types for epic-core

use std::path::PathBuf;
use thiserror::Error;

/// Startup errors raised while loading the environment or a theme.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Theme not found! Location: {}", .0.display())]
    ThemeNotFound(PathBuf),

    #[error("Theme configuration not found! Location: {}", .0.display())]
    ThemeConfigMissing(PathBuf),

    #[error("Invalid theme configuration {}: {source}", .path.display())]
    ThemeConfigInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Startup errors that leave the process without a usable theme.
    pub fn is_theme_error(&self) -> bool {
        matches!(
            self,
            Error::ThemeNotFound(_) | Error::ThemeConfigMissing(_) | Error::ThemeConfigInvalid { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
