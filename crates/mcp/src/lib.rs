//! MCP (Model Context Protocol) client library.
//!
//! Connects to tool servers over one of two channels: a spawned
//! subprocess speaking line-delimited JSON on stdio, or a running HTTP
//! server speaking server-sent events. Either way the conversation is
//! the same JSON-RPC protocol: initialize, list tools, call tools.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Connection, Endpoint};
//!
//! # async fn example() -> mcp::Result<()> {
//! let endpoint = Endpoint::stdio("wikipedia", "uv", ["run", "wikipedia_server.py"]);
//!
//! let connection = Connection::connect(&endpoint).await?;
//! for tool in connection.tools().await {
//!     println!("tool: {}", tool.name);
//! }
//!
//! let result = connection
//!     .call_tool("search_articles", Some(serde_json::json!({"topic": "rust"})))
//!     .await?;
//! println!("{}", result.text());
//!
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod endpoint;
mod error;
mod protocol;
mod transport;

pub use connection::{Connection, ConnectionState};
pub use endpoint::{Endpoint, TransportConfig};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Content, Incoming, InitializeParams, InitializeResult,
    ListToolsResult, Notification, PROTOCOL_VERSION, Request, RequestId, Response, RpcError,
    ServerInfo, Tool, methods,
};
pub use transport::{DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE};
