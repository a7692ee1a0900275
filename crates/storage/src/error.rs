use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("event encoding: {0}")]
    Encode(#[from] serde_json::Error),

    /// A stored row no longer decodes into an event.
    #[error("corrupt log row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
