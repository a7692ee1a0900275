//! Tool routing across every connected server.
//!
//! Each server contributes its tools to one merged catalog; the pool
//! remembers which server owns which name and forwards invocations
//! accordingly, so callers never deal with individual connections.

use std::collections::HashMap;
use std::future::Future;

use mcp::{CallToolResult, Connection, Content, Endpoint};
use serde_json::Value;
use thiserror::Error;

use crate::model::ToolSpec;

/// Establishing a connection to one configured endpoint failed.
///
/// `ToolPool::connect` is fail-fast, so this also means no pool was built.
#[derive(Debug, Error)]
#[error("failed to connect to '{endpoint}': {source}")]
pub struct ConnectError {
    pub endpoint: String,
    #[source]
    pub source: mcp::Error,
}

/// Routing or forwarding a tool invocation failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No connected server owns a tool with this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The owning server rejected or failed the invocation.
    #[error("server '{server}': {source}")]
    Server {
        server: String,
        #[source]
        source: mcp::Error,
    },
}

/// One connected tool server, as the pool sees it.
///
/// The seam exists so the pool and the session driver can be exercised
/// without spawning processes.
pub trait Provider: Send + Sync {
    /// The configured endpoint name.
    fn name(&self) -> &str;

    /// Tools this server declared at connect time.
    fn tools(&self) -> &[ToolSpec];

    /// Invoke one of this server's tools.
    fn call(&self, name: &str, input: Value) -> impl Future<Output = Result<Value, mcp::Error>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// A [`Provider`] backed by an MCP connection.
pub struct McpProvider {
    connection: Connection,
    specs: Vec<ToolSpec>,
}

impl McpProvider {
    /// Connect to the endpoint and cache its tool specs.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, mcp::Error> {
        let connection = Connection::connect(endpoint).await?;
        let specs = connection
            .tools()
            .await
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
            })
            .collect();
        Ok(Self { connection, specs })
    }
}

impl Provider for McpProvider {
    fn name(&self) -> &str {
        self.connection.name()
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn call(&self, name: &str, input: Value) -> Result<Value, mcp::Error> {
        let result = self.connection.call_tool(name, Some(input)).await?;
        Ok(payload_from(result))
    }

    async fn close(self) {
        self.connection.close().await;
    }
}

/// A single text block becomes a plain string (what the model reads best);
/// anything richer is passed through as structured content.
fn payload_from(result: CallToolResult) -> Value {
    match result.content.as_slice() {
        [Content::Text { text }] => Value::String(text.clone()),
        _ => serde_json::to_value(&result.content).unwrap_or(Value::Null),
    }
}

/// Connections to every configured tool server, plus the merged catalog.
pub struct ToolPool<C = McpProvider> {
    providers: Vec<C>,
    owners: HashMap<String, usize>,
    catalog: Vec<ToolSpec>,
}

impl<C> std::fmt::Debug for ToolPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolPool")
            .field("providers", &self.providers.len())
            .field("owners", &self.owners)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl ToolPool<McpProvider> {
    /// Connect to each endpoint in listed order.
    ///
    /// Fail-fast: the first endpoint that cannot be reached aborts the
    /// whole connect; already-open connections are closed again in
    /// reverse order and no partial pool is returned.
    ///
    /// If two servers declare the same tool name, the later endpoint in
    /// the list wins and its descriptor replaces the earlier one.
    pub async fn connect(endpoints: &[Endpoint]) -> Result<Self, ConnectError> {
        let mut providers = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            match McpProvider::connect(endpoint).await {
                Ok(provider) => {
                    tracing::info!(
                        server = %endpoint.name,
                        tools = provider.tools().len(),
                        "connected"
                    );
                    providers.push(provider);
                }
                Err(source) => {
                    for provider in providers.into_iter().rev() {
                        provider.close().await;
                    }
                    return Err(ConnectError {
                        endpoint: endpoint.name.clone(),
                        source,
                    });
                }
            }
        }

        Ok(Self::from_providers(providers))
    }
}

impl<C: Provider> ToolPool<C> {
    /// Build a pool from already-connected providers, merging catalogs.
    pub fn from_providers(providers: Vec<C>) -> Self {
        let mut owners = HashMap::new();
        let mut catalog: Vec<ToolSpec> = Vec::new();

        for (index, provider) in providers.iter().enumerate() {
            for spec in provider.tools() {
                if owners.insert(spec.name.clone(), index).is_some() {
                    tracing::warn!(
                        tool = %spec.name,
                        server = %provider.name(),
                        "tool name collision, later server shadows earlier"
                    );
                    if let Some(existing) = catalog.iter_mut().find(|s| s.name == spec.name) {
                        *existing = spec.clone();
                    }
                } else {
                    catalog.push(spec.clone());
                }
            }
        }

        Self {
            providers,
            owners,
            catalog,
        }
    }

    /// The merged tool catalog. Read-only until `disconnect_all`.
    pub fn tools(&self) -> &[ToolSpec] {
        &self.catalog
    }

    /// The connected providers, in connection order.
    pub fn providers(&self) -> &[C] {
        &self.providers
    }

    /// Which server owns a tool name.
    pub fn owner_of(&self, tool: &str) -> Option<&str> {
        self.owners
            .get(tool)
            .map(|&index| self.providers[index].name())
    }

    /// Route an invocation to the owning server.
    ///
    /// An unowned name fails with [`DispatchError::UnknownTool`] without
    /// touching any connection. No retry is performed.
    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, DispatchError> {
        let Some(&index) = self.owners.get(name) else {
            return Err(DispatchError::UnknownTool(name.to_string()));
        };

        let provider = &self.providers[index];
        tracing::debug!(tool = %name, server = %provider.name(), "dispatching");

        provider
            .call(name, input)
            .await
            .map_err(|source| DispatchError::Server {
                server: provider.name().to_string(),
                source,
            })
    }

    /// Close every connection in reverse acquisition order and clear the
    /// catalog. Calling it again is a no-op.
    pub async fn disconnect_all(&mut self) {
        while let Some(provider) = self.providers.pop() {
            provider.close().await;
        }
        self.owners.clear();
        self.catalog.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn routes_to_the_declaring_server() {
        let wikipedia = FakeProvider::new("wikipedia", &["search_articles"]);
        let weather = FakeProvider::new("weather", &["forecast"]);
        let wikipedia_calls = wikipedia.calls.clone();
        let weather_calls = weather.calls.clone();

        let pool = ToolPool::from_providers(vec![wikipedia, weather]);
        assert_eq!(pool.tools().len(), 2);
        assert_eq!(pool.owner_of("forecast"), Some("weather"));

        pool.invoke("forecast", json!({"city": "Lima"})).await.unwrap();

        assert!(wikipedia_calls.lock().unwrap().is_empty());
        let calls = weather_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "forecast");
    }

    #[tokio::test]
    async fn later_server_shadows_earlier_on_collision() {
        let first = FakeProvider::new("first", &["lookup"]).with_response(json!("from first"));
        let second = FakeProvider::new("second", &["lookup"]).with_response(json!("from second"));
        let first_calls = first.calls.clone();

        let pool = ToolPool::from_providers(vec![first, second]);

        // One catalog entry, owned by the later server.
        assert_eq!(pool.tools().len(), 1);
        assert_eq!(pool.tools()[0].description, "lookup from second");
        assert_eq!(pool.owner_of("lookup"), Some("second"));

        let payload = pool.invoke("lookup", json!({})).await.unwrap();
        assert_eq!(payload, json!("from second"));
        assert!(first_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_makes_no_transport_call() {
        let provider = FakeProvider::new("only", &["lookup"]);
        let calls = provider.calls.clone();

        let pool = ToolPool::from_providers(vec![provider]);
        let err = pool.invoke("missing", json!({})).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnknownTool(name) if name == "missing"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_failure_is_wrapped_with_owner_name() {
        let provider = FakeProvider::new("flaky", &["lookup"]).failing();
        let pool = ToolPool::from_providers(vec![provider]);

        let err = pool.invoke("lookup", json!({})).await.unwrap_err();
        match err {
            DispatchError::Server { server, .. } => assert_eq!(server, "flaky"),
            DispatchError::UnknownTool(_) => panic!("expected server error"),
        }
    }

    #[tokio::test]
    async fn disconnect_all_is_idempotent() {
        let mut pool = ToolPool::from_providers(vec![FakeProvider::new("a", &["t1"])]);
        assert_eq!(pool.tools().len(), 1);

        pool.disconnect_all().await;
        assert!(pool.tools().is_empty());
        assert!(pool.owner_of("t1").is_none());

        // Second call must not panic and leaves the pool empty.
        pool.disconnect_all().await;
        assert!(pool.tools().is_empty());
    }

    #[tokio::test]
    async fn disconnect_all_releases_in_reverse_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pool = ToolPool::from_providers(vec![
            FakeProvider::new("first", &["a"]).with_close_log(log.clone()),
            FakeProvider::new("second", &["b"]).with_close_log(log.clone()),
            FakeProvider::new("third", &["c"]).with_close_log(log.clone()),
        ]);

        pool.disconnect_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn connect_is_fail_fast() {
        // A command that cannot exist; the spawn fails before any handshake.
        let endpoints = [mcp::Endpoint::stdio(
            "broken",
            "switchboard-no-such-binary",
            Vec::<String>::new(),
        )];

        let err = ToolPool::connect(&endpoints).await.unwrap_err();
        assert_eq!(err.endpoint, "broken");
        assert!(matches!(err.source, mcp::Error::Spawn(_)));
    }
}
