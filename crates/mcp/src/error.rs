//! What can go wrong between this client and a tool server.

use std::time::Duration;

use crate::protocol::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The server process could not be started.
    #[error("could not start server process: {0}")]
    Spawn(std::io::Error),

    /// Reaching the server's endpoint failed.
    #[error("could not connect: {0}")]
    Connect(String),

    /// The connection was used before its handshake finished.
    #[error("connection not ready")]
    NotReady,

    /// The connection was used after being closed.
    #[error("connection is closed")]
    Closed,

    /// The server went away mid-conversation.
    #[error("server closed the channel")]
    ChannelClosed,

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Reading or writing the channel failed.
    #[error("channel i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The server broke the protocol (unparseable frame, id mismatch,
    /// malformed endpoint event).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error object.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The server completed the call but flagged the result as an error.
    #[error("tool reported an error: {0}")]
    ToolFailed(String),

    /// The SSE channel failed.
    #[error("event stream: {0}")]
    Stream(String),

    /// A reply exceeded the size limit.
    #[error("reply of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
