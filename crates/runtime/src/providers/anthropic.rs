//! Anthropic Messages API backend.

use crate::model::{
    Backend, Block, ModelError, ModelRequest, ModelResponse, Role, ToolOutcome, ToolUse, Turn,
    Usage,
};
use serde_json::Value;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request and response bodies as the Messages API defines them.
mod wire {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Debug, Serialize)]
    pub(super) struct MessagesRequest {
        pub model: String,
        pub max_tokens: u32,
        pub messages: Vec<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub tools: Vec<ToolDef>,
    }

    #[derive(Debug, Serialize)]
    pub(super) struct Message {
        pub role: &'static str,
        pub content: Vec<ContentBlock>,
    }

    #[derive(Debug, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum ContentBlock {
        Text {
            text: String,
        },
        ToolUse {
            id: String,
            name: String,
            input: Value,
        },
        ToolResult {
            tool_use_id: String,
            content: String,
            #[serde(skip_serializing_if = "std::ops::Not::not")]
            is_error: bool,
        },
    }

    #[derive(Debug, Serialize)]
    pub(super) struct ToolDef {
        pub name: String,
        pub description: String,
        pub input_schema: Value,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct MessagesResponse {
        pub content: Vec<ReplyBlock>,
        pub usage: UsageCounts,
    }

    /// Reply content. Block types this client does not handle (thinking,
    /// server tool use) deserialize as `Other` and are dropped.
    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum ReplyBlock {
        Text {
            text: String,
        },
        ToolUse {
            id: String,
            name: String,
            input: Value,
        },
        #[serde(other)]
        Other,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct UsageCounts {
        pub input_tokens: u32,
        pub output_tokens: u32,
    }
}

/// History turns to wire messages.
///
/// Consecutive same-role turns are folded into one message: the session
/// appends one turn per tool result, and the API wants those as content
/// blocks of a single user message.
fn encode_history(turns: &[Turn]) -> Vec<wire::Message> {
    let mut messages: Vec<wire::Message> = Vec::new();

    for turn in turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let blocks = turn.blocks.iter().map(encode_block);

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(wire::Message {
                role,
                content: blocks.collect(),
            }),
        }
    }

    messages
}

fn encode_block(block: &Block) -> wire::ContentBlock {
    match block {
        Block::Text { text } => wire::ContentBlock::Text { text: text.clone() },
        Block::ToolUse(call) => wire::ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        },
        Block::ToolResult(result) => {
            let (content, is_error) = match &result.outcome {
                ToolOutcome::Success { payload } => (payload_text(payload), false),
                ToolOutcome::Failure { message } => (message.clone(), true),
            };
            wire::ContentBlock::ToolResult {
                tool_use_id: result.tool_use_id.clone(),
                content,
                is_error,
            }
        }
    }
}

fn decode_reply(blocks: Vec<wire::ReplyBlock>) -> Turn {
    let mut out = Vec::new();
    for block in blocks {
        match block {
            wire::ReplyBlock::Text { text } => out.push(Block::Text { text }),
            wire::ReplyBlock::ToolUse { id, name, input } => {
                out.push(Block::ToolUse(ToolUse { id, name, input }));
            }
            wire::ReplyBlock::Other => {}
        }
    }
    Turn::assistant(out)
}

/// String payloads go to the model as-is; structured ones as JSON text.
fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builder for [`AnthropicBackend`].
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
        }
    }
}

/// [`Backend`] over the Messages API, authenticated with an API key.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn builder(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl Backend for AnthropicBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = wire::MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: encode_history(request.turns),
            system: request.system.map(str::to_string),
            tools: request
                .tools
                .iter()
                .map(|spec| wire::ToolDef {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    input_schema: spec.input_schema.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let reply: wire::MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(ModelResponse {
            turn: decode_reply(reply.content),
            usage: Usage {
                input_tokens: reply.usage.input_tokens,
                output_tokens: reply.usage.output_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;

    #[test]
    fn consecutive_same_role_turns_fold_into_one_message() {
        let turns = vec![
            Turn::user("look up rust"),
            Turn::assistant(vec![
                Block::text("checking"),
                Block::ToolUse(ToolUse {
                    id: "tu_1".into(),
                    name: "lookup".into(),
                    input: serde_json::json!({"query": "rust"}),
                }),
            ]),
            Turn::tool_result(ToolResult::success("tu_1", Value::String("found".into()))),
            Turn::tool_result(ToolResult::failure("tu_2", "boom")),
        ];

        let messages = encode_history(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        // Both result turns fold into one trailing user message.
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content.len(), 2);
    }

    #[test]
    fn failed_result_is_marked_is_error_on_the_wire() {
        let block = encode_block(&Block::ToolResult(ToolResult::failure(
            "tu_9",
            "no such page",
        )));
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "tu_9");
        assert_eq!(json["is_error"], true);
        assert_eq!(json["content"], "no such page");
    }

    #[test]
    fn successful_result_omits_error_flag() {
        let block = encode_block(&Block::ToolResult(ToolResult::success(
            "tu_1",
            Value::String("article text".into()),
        )));
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("is_error").is_none());
    }

    #[test]
    fn unhandled_reply_blocks_are_dropped() {
        let reply: Vec<wire::ReplyBlock> = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "hello"},
            {"type": "thinking", "thinking": "..."},
            {"type": "tool_use", "id": "tu_1", "name": "lookup", "input": {}}
        ]))
        .unwrap();

        let turn = decode_reply(reply);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.blocks.len(), 2);
        assert_eq!(turn.tool_uses().len(), 1);
    }

    #[test]
    fn structured_payloads_render_as_json_text() {
        assert_eq!(payload_text(&Value::String("plain".into())), "plain");
        assert_eq!(
            payload_text(&serde_json::json!({"titles": ["Rust"]})),
            r#"{"titles":["Rust"]}"#
        );
    }
}
