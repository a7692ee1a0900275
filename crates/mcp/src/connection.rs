//! One logical session to a tool server.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult, ListToolsResult,
    Notification, Request, RequestId, Response, Tool, methods,
};
use crate::transport::{DEFAULT_TIMEOUT, Transport};

/// Lifecycle of a [`Connection`].
///
/// `Closed` is terminal; to talk to the server again a new connection
/// must be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Ready,
    Closed,
}

/// A live connection to one tool server.
///
/// [`Connection::connect`] establishes the channel, runs the MCP
/// handshake and caches the server's tool list. Replies are matched to
/// requests by id; notifications the server interleaves are skipped.
pub struct Connection {
    name: String,
    transport: Transport,
    next_id: AtomicI64,
    state: Mutex<ConnectionState>,
    server: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Connection {
    /// Connect to the endpoint and run the handshake.
    ///
    /// The underlying channel is torn down again if any handshake step
    /// fails, so an `Err` never leaks a half-open connection.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let transport = Transport::connect(&endpoint.transport).await?;

        let connection = Self {
            name: endpoint.name.clone(),
            transport,
            next_id: AtomicI64::new(1),
            state: Mutex::new(ConnectionState::Initializing),
            server: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        };

        if let Err(e) = connection.handshake().await {
            connection.transport.close().await;
            *connection.state.lock().await = ConnectionState::Closed;
            return Err(e);
        }

        Ok(connection)
    }

    async fn handshake(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::new())?;
        let result: InitializeResult = self.request(methods::INITIALIZE, Some(params)).await?;
        tracing::debug!(
            server = %self.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "handshake complete"
        );

        self.transport
            .send(serde_json::to_string(&Notification::new(
                methods::INITIALIZED,
                None,
            ))?)
            .await?;

        *self.server.lock().await = Some(result);
        *self.state.lock().await = ConnectionState::Ready;

        self.refresh_tools().await
    }

    /// The configured endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Server info exchanged during the handshake.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server.lock().await.clone()
    }

    /// The cached tool list.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Re-fetch the tool list from the server.
    pub async fn refresh_tools(&self) -> Result<()> {
        self.ensure_ready().await?;
        let result: ListToolsResult = self.request(methods::LIST_TOOLS, None).await?;
        tracing::debug!(server = %self.name, tools = result.tools.len(), "tool list refreshed");
        *self.tools.lock().await = result.tools;
        Ok(())
    }

    /// Call a tool by name.
    ///
    /// A result the server flags `isError` is surfaced as
    /// [`Error::ToolFailed`] carrying the result's text content.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_ready().await?;

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        let result: CallToolResult = self.request(methods::CALL_TOOL, Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolFailed(result.text()));
        }

        Ok(result)
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if *state == ConnectionState::Closed {
            return;
        }
        *state = ConnectionState::Closed;
        drop(state);

        self.transport.close().await;
        tracing::debug!(server = %self.name, "connection closed");
    }

    async fn ensure_ready(&self) -> Result<()> {
        match *self.state.lock().await {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Initializing => Err(Error::NotReady),
            ConnectionState::Closed => Err(Error::Closed),
        }
    }

    /// Send one request and wait for its reply, bounded by the default
    /// timeout.
    async fn request<R>(&self, method: &'static str, params: Option<Value>) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let id = RequestId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = Request::new(id.clone(), method, params);

        self.transport.send(serde_json::to_string(&request)?).await?;

        let response = timeout(DEFAULT_TIMEOUT, self.read_reply(&id))
            .await
            .map_err(|_| Error::Timeout(DEFAULT_TIMEOUT))??;

        Ok(serde_json::from_value(response.outcome()?)?)
    }

    /// Read until the reply matching `id` arrives, skipping any
    /// notifications the server interleaves.
    async fn read_reply(&self, id: &RequestId) -> Result<Response> {
        loop {
            let raw = self.transport.recv().await?;
            let message: Incoming = serde_json::from_str(raw.trim())
                .map_err(|e| Error::Protocol(format!("unparseable frame: {e}")))?;

            match message {
                Incoming::Notification(n) => {
                    tracing::trace!(server = %self.name, method = %n.method, "server notification");
                }
                Incoming::Response(response) if response.id == *id => return Ok(response),
                Incoming::Response(response) => {
                    return Err(Error::Protocol(format!(
                        "reply id {:?} does not match request id {id:?}",
                        response.id
                    )));
                }
            }
        }
    }
}
