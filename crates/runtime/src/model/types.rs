//! Provider-agnostic conversation types.
//!
//! The conversation history is an ordered sequence of [`Turn`]s; each turn
//! is a role plus ordered content [`Block`]s. Tool results ride in
//! user-role turns, matching what the model API expects back.

use super::errors::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Who a turn is attributed to.
///
/// There is no tool role: tool results travel in user-role turns, which
/// is how the model API wants them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    /// Correlates the result the model will see with this request.
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// What came back from dispatching one tool request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { message: String },
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// A tool outcome paired with the request it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(tool_use_id: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    pub fn failure(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            outcome: ToolOutcome::Failure {
                message: message.into(),
            },
        }
    }
}

/// One unit of a turn's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

impl Block {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }
}

/// One entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<Block>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::text(text)],
        }
    }

    pub fn assistant(blocks: Vec<Block>) -> Self {
        Self {
            role: Role::Assistant,
            blocks,
        }
    }

    /// The turn carrying one tool result back to the model.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::ToolResult(result)],
        }
    }

    /// Combined text content of all text blocks, in order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if let Block::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    /// All tool requests in this turn, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUse> {
        let mut calls = Vec::new();
        for block in &self.blocks {
            if let Block::ToolUse(call) = block {
                calls.push(call);
            }
        }
        calls
    }
}

/// A tool definition as the model sees it: the merged catalog is a list
/// of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Token counts reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Everything one model call needs.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub turns: &'a [Turn],
    pub tools: &'a [ToolSpec],
    pub system: Option<&'a str>,
}

/// The model's reply: one assistant turn plus usage counts.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub turn: Turn,
    pub usage: Usage,
}

/// The model endpoint seam. One implementation talks to the real API;
/// tests script their own.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}
