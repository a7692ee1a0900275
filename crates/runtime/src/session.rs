//! The conversation driver.
//!
//! A [`Session`] owns the history and loops between the model endpoint and
//! the tool pool: every tool request the model emits is dispatched in
//! order and answered with exactly one result turn, until the model
//! replies without requesting any tools.

use serde_json::Value;
use storage::{Event, EventKind, EventStore, SessionId};

use crate::model::{Backend, Block, ModelRequest, ToolOutcome, ToolResult, ToolUse, Turn};
use crate::pool::{Provider, ToolPool};
use crate::{Error, Result};

/// Upper bound on model/tool exchange rounds within one query, so a model
/// that never stops requesting tools cannot loop forever.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

/// Where the driver surfaces progress while a query runs.
///
/// The driver itself never prints; a UI implements this to render text as
/// it arrives and show which server a tool request went to.
pub trait EventSink {
    fn on_text(&self, _text: &str) {}
    fn on_tool_start(&self, _server: &str, _call: &ToolUse) {}
    fn on_tool_end(&self, _result: &ToolResult) {}
}

/// Sink that swallows everything.
#[derive(Debug, Default)]
pub struct QuietSink;

impl EventSink for QuietSink {}

/// A conversation session over a connected tool pool.
pub struct Session<B, C> {
    pub id: SessionId,
    store: EventStore,
    backend: B,
    pool: ToolPool<C>,
    history: Vec<Turn>,
    system: Option<String>,
    max_tool_rounds: usize,
}

impl<B: Backend, C: Provider> Session<B, C> {
    /// Create a new session over an already-connected pool.
    pub fn new(store: EventStore, backend: B, pool: ToolPool<C>) -> Result<Self> {
        let id = SessionId::new();
        store.append(&Event::new(id, EventKind::SessionStart))?;

        Ok(Self {
            id,
            store,
            backend,
            pool,
            history: Vec::new(),
            system: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        })
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the tool-round cap.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// The pool this session dispatches through.
    pub fn pool(&self) -> &ToolPool<C> {
        &self.pool
    }

    /// The conversation so far.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Run one user query to completion and return the assistant's text.
    ///
    /// Failed tool dispatches (including unknown tool names) become result
    /// turns the model can react to; only a failed model call aborts the
    /// query, leaving every turn appended so far in place.
    pub async fn query(&mut self, user_text: &str, sink: &impl EventSink) -> Result<String> {
        self.history.push(Turn::user(user_text));
        self.store
            .append(&Event::message(self.id, storage::Role::User, user_text))?;

        let mut reply = String::new();
        let mut rounds = 0;

        loop {
            let response = self
                .backend
                .call(ModelRequest {
                    turns: &self.history,
                    tools: self.pool.tools(),
                    system: self.system.as_deref(),
                })
                .await
                .map_err(Error::Model)?;

            let turn = response.turn;
            tracing::debug!(
                blocks = turn.blocks.len(),
                tokens = response.usage.total_tokens(),
                "model reply"
            );

            let text = turn.text();
            if !text.is_empty() {
                self.store
                    .append(&Event::message(self.id, storage::Role::Assistant, &text))?;
            }

            for block in &turn.blocks {
                if let Block::Text { text } = block {
                    reply.push_str(text);
                    sink.on_text(text);
                }
            }

            let requests: Vec<ToolUse> = turn.tool_uses().into_iter().cloned().collect();
            self.history.push(turn);

            if requests.is_empty() {
                break;
            }

            for call in &requests {
                let result = self.dispatch(call, sink).await?;
                self.history.push(Turn::tool_result(result));
            }

            rounds += 1;
            if rounds >= self.max_tool_rounds {
                tracing::warn!(rounds, "tool round cap reached, stopping");
                break;
            }
        }

        Ok(reply)
    }

    /// Dispatch one tool request; failures become failure results, never
    /// errors, so the conversation can continue.
    async fn dispatch(&self, call: &ToolUse, sink: &impl EventSink) -> Result<ToolResult> {
        let server = self
            .pool
            .owner_of(&call.name)
            .unwrap_or("unknown")
            .to_string();
        sink.on_tool_start(&server, call);
        self.store.append(&Event::tool_call(
            self.id,
            &call.id,
            server,
            &call.name,
            call.input.clone(),
        ))?;

        let result = match self.pool.invoke(&call.name, call.input.clone()).await {
            Ok(payload) => ToolResult::success(call.id.clone(), payload),
            Err(e) => ToolResult::failure(call.id.clone(), e.to_string()),
        };

        let (output, is_error) = match &result.outcome {
            ToolOutcome::Success { payload } => (payload.clone(), false),
            ToolOutcome::Failure { message } => (Value::String(message.clone()), true),
        };
        self.store.append(&Event::tool_result(
            self.id,
            &call.id,
            &call.name,
            output,
            is_error,
        ))?;

        sink.on_tool_end(&result);
        Ok(result)
    }

    /// End the session: disconnect every server and mark the log.
    pub async fn end(mut self) -> Result<()> {
        self.pool.disconnect_all().await;
        self.store
            .append(&Event::new(self.id, EventKind::SessionEnd))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelResponse, Role, Usage};
    use crate::pool::testing::FakeProvider;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend that replays a script of turns, one per call.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Turn>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedBackend {
        fn new(replies: impl IntoIterator<Item = Turn>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Shared handle to the model-call counter.
        fn call_counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    impl Backend for ScriptedBackend {
        fn call(
            &self,
            _request: ModelRequest<'_>,
        ) -> impl std::future::Future<Output = std::result::Result<ModelResponse, ModelError>> + Send
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let turn = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Turn::assistant(vec![]));
            async move {
                Ok(ModelResponse {
                    turn,
                    usage: Usage::default(),
                })
            }
        }
    }

    /// Backend that requests the same tool forever.
    struct RelentlessBackend;

    impl Backend for RelentlessBackend {
        async fn call(
            &self,
            _request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            Ok(ModelResponse {
                turn: Turn::assistant(vec![Block::ToolUse(ToolUse {
                    id: "tu_again".into(),
                    name: "lookup".into(),
                    input: json!({}),
                })]),
                usage: Usage::default(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn on_text(&self, text: &str) {
            self.events.lock().unwrap().push(format!("text:{text}"));
        }

        fn on_tool_start(&self, server: &str, call: &ToolUse) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{}@{server}", call.name));
        }

        fn on_tool_end(&self, result: &ToolResult) {
            let status = if result.outcome.is_failure() { "err" } else { "ok" };
            self.events.lock().unwrap().push(format!("end:{status}"));
        }
    }

    fn tool_use(id: &str, name: &str, input: Value) -> Block {
        Block::ToolUse(ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        })
    }

    fn session_with(
        backend: impl Backend,
        providers: Vec<FakeProvider>,
    ) -> Session<impl Backend, FakeProvider> {
        Session::new(
            EventStore::in_memory().unwrap(),
            backend,
            ToolPool::from_providers(providers),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn text_only_reply_ends_after_one_model_call() {
        let backend = ScriptedBackend::new([Turn::assistant(vec![
            Block::text("Hello"),
            Block::text(", world"),
        ])]);
        let model_calls = backend.call_counter();
        let mut session = session_with(backend, vec![FakeProvider::new("wiki", &["lookup"])]);

        let reply = session.query("hi", &QuietSink).await.unwrap();

        assert_eq!(reply, "Hello, world");
        assert_eq!(model_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].role, Role::User);
        assert_eq!(session.history()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn lookup_scenario_end_to_end() {
        let provider = FakeProvider::new("wiki", &["lookup"]).with_response(json!("X-info"));
        let calls = provider.calls.clone();
        let backend = ScriptedBackend::new([
            Turn::assistant(vec![tool_use("tu_1", "lookup", json!({"query": "X"}))]),
            Turn::assistant(vec![Block::text("X-info")]),
        ]);
        let mut session = session_with(backend, vec![provider]);
        let sink = RecordingSink::default();

        let reply = session.query("look up X", &sink).await.unwrap();

        assert_eq!(reply, "X-info");

        // user, assistant tool request, tool result, assistant text.
        let history = session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].tool_uses().len(), 1);
        assert!(matches!(
            &history[2].blocks[0],
            Block::ToolResult(r)
                if r.tool_use_id == "tu_1" && !r.outcome.is_failure()
        ));
        assert_eq!(history[3].text(), "X-info");

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], ("lookup".to_string(), json!({"query": "X"})));

        assert_eq!(
            *sink.events.lock().unwrap(),
            vec!["start:lookup@wiki", "end:ok", "text:X-info"]
        );
    }

    #[tokio::test]
    async fn every_request_gets_a_result_turn_in_order() {
        let provider = FakeProvider::new("wiki", &["search_articles", "get_article_content"]);
        let calls = provider.calls.clone();
        let backend = ScriptedBackend::new([
            Turn::assistant(vec![
                tool_use("tu_1", "search_articles", json!({"topic": "rust"})),
                tool_use("tu_2", "get_article_content", json!({"article_title": "Rust"})),
            ]),
            Turn::assistant(vec![Block::text("done")]),
        ]);
        let mut session = session_with(backend, vec![provider]);

        session.query("tell me about rust", &QuietSink).await.unwrap();

        // user, assistant, result for tu_1, result for tu_2, assistant.
        let history = session.history();
        assert_eq!(history.len(), 5);
        for (turn, id) in history[2..4].iter().zip(["tu_1", "tu_2"]) {
            assert!(matches!(
                &turn.blocks[0],
                Block::ToolResult(r) if r.tool_use_id == id
            ));
        }

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded[0].0, "search_articles");
        assert_eq!(recorded[1].0, "get_article_content");
    }

    #[tokio::test]
    async fn failed_dispatch_becomes_a_result_turn_and_the_loop_continues() {
        let backend = ScriptedBackend::new([
            Turn::assistant(vec![tool_use("tu_1", "lookup", json!({}))]),
            Turn::assistant(vec![Block::text("sorry, that failed")]),
        ]);
        let model_calls = backend.call_counter();
        let provider = FakeProvider::new("wiki", &["lookup"]).failing();
        let calls = provider.calls.clone();
        let mut session = session_with(backend, vec![provider]);

        let reply = session.query("look it up", &QuietSink).await.unwrap();

        assert_eq!(reply, "sorry, that failed");
        assert_eq!(calls.lock().unwrap().len(), 1);
        // The failure did not abort the loop; the model saw the result.
        assert_eq!(model_calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            &session.history()[2].blocks[0],
            Block::ToolResult(r) if r.outcome.is_failure()
        ));
    }

    #[tokio::test]
    async fn unknown_tool_still_gets_a_result_turn() {
        let backend = ScriptedBackend::new([
            Turn::assistant(vec![tool_use("tu_1", "missing_tool", json!({}))]),
            Turn::assistant(vec![Block::text("never mind")]),
        ]);
        let mut session = session_with(backend, vec![FakeProvider::new("wiki", &["lookup"])]);

        session.query("use the missing tool", &QuietSink).await.unwrap();

        match &session.history()[2].blocks[0] {
            Block::ToolResult(result) => match &result.outcome {
                ToolOutcome::Failure { message } => assert!(message.contains("unknown tool")),
                ToolOutcome::Success { .. } => panic!("expected failure outcome"),
            },
            other => panic!("expected tool result block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn round_cap_stops_a_model_that_never_finishes() {
        let provider = FakeProvider::new("wiki", &["lookup"]);
        let calls = provider.calls.clone();
        let mut session =
            session_with(RelentlessBackend, vec![provider]).with_max_tool_rounds(3);

        let reply = session.query("go", &QuietSink).await.unwrap();

        assert_eq!(reply, "");
        assert_eq!(calls.lock().unwrap().len(), 3);
        // Every request still has its matching result turn.
        assert_eq!(session.history().len(), 1 + 3 * 2);
    }

    #[tokio::test]
    async fn empty_reply_is_an_empty_text_turn() {
        let backend = ScriptedBackend::new([Turn::assistant(vec![])]);
        let mut session = session_with(backend, vec![FakeProvider::new("wiki", &["lookup"])]);

        let reply = session.query("hello?", &QuietSink).await.unwrap();

        assert_eq!(reply, "");
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn history_accumulates_across_queries() {
        let backend = ScriptedBackend::new([
            Turn::assistant(vec![Block::text("first")]),
            Turn::assistant(vec![Block::text("second")]),
        ]);
        let mut session = session_with(backend, vec![FakeProvider::new("wiki", &["lookup"])]);

        session.query("one", &QuietSink).await.unwrap();
        let reply = session.query("two", &QuietSink).await.unwrap();

        assert_eq!(reply, "second");
        assert_eq!(session.history().len(), 4);
    }
}
