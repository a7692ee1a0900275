//! Declarative description of where a tool server lives.

use serde::Deserialize;
use std::collections::HashMap;

/// One configured tool server: a name plus how to reach it.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

/// Transport-specific connection parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransportConfig {
    /// Spawn the server as a subprocess and speak over stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Connect to a running server's SSE endpoint.
    Sse { url: String },
}

impl Endpoint {
    /// Spawn-a-subprocess endpoint.
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stdio {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
                env: HashMap::new(),
            },
        }
    }

    /// Network SSE endpoint.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Sse { url: url.into() },
        }
    }
}
