//! Switchboard runtime: tool routing and the conversation loop.
//!
//! The runtime sits between a model endpoint and any number of connected
//! tool servers:
//!
//! - **[`ToolPool`]**: connections to every configured server, their tools
//!   merged into one catalog with an ownership map for dispatch.
//! - **[`Session`]**: a conversation that loops between the model and the
//!   pool until the model stops requesting tools.
//! - **[`Backend`]**: the model endpoint seam ([`AnthropicBackend`] is the
//!   provided implementation).
//!
//! # Example
//!
//! ```ignore
//! use mcp::Endpoint;
//! use runtime::{AnthropicBackend, QuietSink, Session, ToolPool};
//! use storage::EventStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let pool =
//!     ToolPool::connect(&[Endpoint::sse("wikipedia", "http://localhost:8000/sse")]).await?;
//! let backend = AnthropicBackend::builder("sk-ant-api03-...", "claude-sonnet-4-20250514").build();
//! let store = EventStore::in_memory()?;
//!
//! let mut session = Session::new(store, backend, pool)?;
//! let reply = session.query("look up Rust on wikipedia", &QuietSink).await?;
//! println!("{reply}");
//! session.end().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod pool;
mod providers;
mod session;

// Conversation model and the backend seam.
pub use model::{
    Backend, Block, ModelError, ModelRequest, ModelResponse, Role, ToolOutcome, ToolResult,
    ToolSpec, ToolUse, Turn, Usage,
};

// Tool routing.
pub use pool::{ConnectError, DispatchError, McpProvider, Provider, ToolPool};

// Model endpoint backends.
pub use providers::{AnthropicBackend, AnthropicBackendBuilder};

// Conversation driver.
pub use session::{DEFAULT_MAX_TOOL_ROUNDS, EventSink, QuietSink, Session};

// Error types.
pub use error::{Error, Result};
