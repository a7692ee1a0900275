use thiserror::Error;

/// Fatal errors a session can surface. Tool dispatch failures are not
/// here: those become result turns the model gets to see.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] crate::model::ModelError),

    #[error(transparent)]
    Connect(#[from] crate::pool::ConnectError),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
