//! Terminal rendering: live session progress and stored log events.

use chrono::{DateTime, Local, TimeZone, Utc};
use runtime::{EventSink, ToolOutcome, ToolResult, ToolUse};
use serde_json::Value;
use storage::{Event, EventKind, Role};

/// How much tool output / message text to show per line.
const PREVIEW_CHARS: usize = 200;

/// Renders driver progress as it happens: reply text, plus which server
/// each tool request went to and what came back.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn on_text(&self, text: &str) {
        println!("\n{text}");
    }

    fn on_tool_start(&self, server: &str, call: &ToolUse) {
        println!("\n-> {} @{server} {}", call.name, call.input);
    }

    fn on_tool_end(&self, result: &ToolResult) {
        match &result.outcome {
            ToolOutcome::Success { payload } => {
                let text = match payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                println!("   ok: {}", truncate(&text, PREVIEW_CHARS));
            }
            ToolOutcome::Failure { message } => {
                println!("   failed: {message}");
            }
        }
    }
}

/// One stored event, one line.
pub fn print_event(event: &Event) {
    let time = to_local(event.timestamp).format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart => println!("{time}  -- session started --"),
        EventKind::SessionEnd => println!("{time}  -- session ended --"),
        EventKind::Message { role, content } => {
            let who = match role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            println!("{time}  {who}: {}", truncate(content, PREVIEW_CHARS));
        }
        EventKind::ToolCall {
            server,
            name,
            input,
            ..
        } => {
            println!("{time}  tool call {name} @{server} {input}");
        }
        EventKind::ToolResult {
            name,
            output,
            is_error,
            ..
        } => {
            let status = if *is_error { "failed" } else { "ok" };
            println!(
                "{time}  tool {status} {name} {}",
                truncate(&output.to_string(), PREVIEW_CHARS)
            );
        }
    }
}

pub fn to_local(timestamp: DateTime<Utc>) -> DateTime<Local> {
    Local.from_utc_datetime(&timestamp.naive_utc())
}

/// Shorten for display without splitting a multi-byte character.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}
