//! Wire types: JSON-RPC 2.0 framing plus the MCP methods this client
//! speaks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol revision offered during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names the client sends.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
}

/// An outgoing call that expects a reply.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    pub id: RequestId,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method,
            params,
        }
    }
}

/// A one-way message; neither side replies to these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// A reply, correlated to its request by id.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    /// Split the reply into its payload or its error.
    ///
    /// Some servers leave `result` out entirely on void methods even
    /// though JSON-RPC requires it; that counts as `null` here.
    pub fn outcome(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Anything a server may write on its channel.
///
/// Servers interleave notifications (log lines, list-changed hints) with
/// replies, SSE servers especially, so the read loop has to tell the two
/// apart without dropping either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Response(Response),
    Notification(Notification),
}

/// The error object a server attaches to a failed call.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("rpc {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Correlates replies to requests. Servers may echo back numbers or
/// strings; this client only ever issues numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(i64),
    Str(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Num(n)
    }
}

// --- MCP method payloads ---

/// Params for `initialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    /// Announced client capabilities; this client announces none.
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl InitializeParams {
    pub fn new() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "switchboard".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// What `initialize` returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    /// Kept opaque; this client never inspects server capabilities.
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// One entry of a `tools/list` reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// Params for `tools/call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// What `tools/call` returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Every text content block, joined with newlines.
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        for block in &self.content {
            if let Content::Text { text } = block {
                parts.push(text.as_str());
            }
        }
        parts.join("\n")
    }
}

/// One content block of a tool's output.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Resource {
        uri: String,
        mime_type: Option<String>,
        text: Option<String>,
    },
}
