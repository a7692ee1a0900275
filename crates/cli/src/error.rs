//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// Everything the binary can fail with. Marked `#[non_exhaustive]` so
/// new variants do not break matches elsewhere.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No event log on disk yet, so there is nothing to inspect.
    #[error("no event log at {path}; it appears after the first 'switchboard chat'")]
    NoEventLog { path: PathBuf },

    #[error("no session matches '{prefix}'")]
    UnknownSession { prefix: String },

    /// The given prefix is too short to name one session.
    #[error("'{prefix}' is ambiguous, it matches: {matches:?}")]
    AmbiguousSession {
        prefix: String,
        matches: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Connecting to a configured tool server failed.
    #[error(transparent)]
    Connect(#[from] runtime::ConnectError),

    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
