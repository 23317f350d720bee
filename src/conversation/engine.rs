//! Conversational turn engine.
//!
//! A turn runs in these steps:
//! 1. Trim the history and append the user message
//! 2. Ask the backend, offering every live tool
//! 3. Record the assistant reply (text and/or tool calls)
//! 4. Execute each tool call in order and record its result
//! 5. If any tool result was recorded, ask the backend once more without
//!    tools and record the answer
//!
//! There is no second tool round.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::conversation::history::{ConversationStore, History};
use crate::events::TurnEvent;
use crate::llm::{
    ChatDelta, LlmDriver, LlmRequest, LlmResponse, Message, ToolCall, ToolCallAggregator,
};
use crate::mcp::format::format_result;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::router::ToolRouter;
use crate::mcp::schema::openai_tools;

/// Reply sent when the backend produced neither text nor tool calls.
pub const NOTHING_TO_DO_REPLY: &str =
    "I received your message but didn't have anything specific to add or do.";

/// Message surfaced when a turn fails unexpectedly.
pub const UNHANDLED_FAILURE: &str =
    "An unexpected error occurred while processing your request. Please check the logs.";

/// Message surfaced when the reasoning backend fails.
pub const BACKEND_FAILURE: &str = "Error communicating with the AI backend. Please try again.";

/// Default number of non-system messages kept between turns.
pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 20;

/// How the backend is asked for its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    #[default]
    NonStreaming,
    /// Text is forwarded as it arrives.
    Streaming,
}

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub message: String,
    /// Forwarded to the backend as its `user` field.
    pub user_id: Option<String>,
    pub mode: TurnMode,
}

/// Sends turn events; a caller that went away does not stop the turn.
#[derive(Debug, Clone)]
struct EventSink(mpsc::Sender<TurnEvent>);

impl EventSink {
    async fn emit(&self, event: TurnEvent) {
        if self.0.send(event).await.is_err() {
            debug!("Turn caller disconnected; continuing without output");
        }
    }
}

/// Drives conversation turns against the backend and the tool router.
#[derive(Clone)]
pub struct ConversationEngine {
    driver: Arc<dyn LlmDriver>,
    registry: Arc<ToolRegistry>,
    router: ToolRouter,
    store: ConversationStore,
    max_history_length: usize,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("conversations", &self.store.len())
            .field("max_history_length", &self.max_history_length)
            .finish()
    }
}

impl ConversationEngine {
    pub fn new(
        driver: Arc<dyn LlmDriver>,
        registry: Arc<ToolRegistry>,
        router: ToolRouter,
        store: ConversationStore,
    ) -> Self {
        Self {
            driver,
            registry,
            router,
            store,
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
        }
    }

    #[must_use]
    pub fn with_max_history_length(mut self, max_history_length: usize) -> Self {
        self.max_history_length = max_history_length;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Run a turn on its own task and stream its events.
    ///
    /// The stream always ends with [`TurnEvent::Done`]. A panic inside the
    /// turn is logged and reported as a generic failure.
    pub fn run_turn(&self, request: TurnRequest) -> impl Stream<Item = TurnEvent> + Send + 'static {
        let (tx, mut rx) = mpsc::channel(32);
        let engine = self.clone();
        let conversation_id = request.conversation_id.clone();

        tokio::spawn(async move {
            let sink = EventSink(tx);
            let worker_sink = sink.clone();
            let worker = tokio::spawn(async move { engine.turn(request, &worker_sink).await });

            if let Err(e) = worker.await {
                error!(conversation_id = %conversation_id, error = %e, "Unhandled fault during turn");
                sink.emit(TurnEvent::error(UNHANDLED_FAILURE, "unhandled")).await;
            }
            sink.emit(TurnEvent::Done).await;
        });

        async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }

    #[instrument(
        name = "turn",
        skip_all,
        fields(conversation_id = %request.conversation_id, mode = ?request.mode)
    )]
    async fn turn(&self, request: TurnRequest, sink: &EventSink) {
        let handle = self.store.get_or_create(&request.conversation_id);
        let mut history = handle.lock().await;
        self.turn_locked(&mut history, request, sink).await;
    }

    async fn turn_locked(&self, history: &mut History, request: TurnRequest, sink: &EventSink) {
        let removed = history.trim(self.max_history_length);
        if removed > 0 {
            debug!(removed, remaining = history.len(), "Trimmed message history");
        }
        let checkpoint = history.len();
        history.push(Message::user(request.message));

        let tools = openai_tools(&self.registry);
        debug!(tool_count = tools.len(), "Calling reasoning backend");
        let llm_request = LlmRequest {
            messages: history.messages().to_vec(),
            tools,
            user: request.user_id.clone(),
        };

        let reply = match self.ask(llm_request, request.mode, sink).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = ?e, "Reasoning backend call failed");
                history.truncate(checkpoint);
                sink.emit(TurnEvent::error(BACKEND_FAILURE, "backend")).await;
                return;
            }
        };

        let text = reply.content.filter(|t| !t.trim().is_empty());
        if let (Some(text), TurnMode::NonStreaming) = (&text, request.mode) {
            sink.emit(TurnEvent::text(text.clone())).await;
        }

        if text.is_none() && reply.tool_calls.is_empty() {
            info!("Backend returned no text and no tool calls");
            sink.emit(TurnEvent::text(NOTHING_TO_DO_REPLY)).await;
            return;
        }

        let tool_calls = reply.tool_calls;
        if !tool_calls.is_empty() {
            info!(
                tool_count = tool_calls.len(),
                tools = ?tool_calls.iter().map(|c| c.function.name.as_str()).collect::<Vec<_>>(),
                "Backend requested tool calls"
            );
        }
        history.push(Message::assistant(text, tool_calls.clone()));

        if tool_calls.is_empty() {
            return;
        }

        for call in &tool_calls {
            let content = self.run_tool_call(call, sink).await;
            history.push(Message::tool(&call.id, &call.function.name, content));
        }
        debug!(tool_results = tool_calls.len(), "Recorded tool results; requesting follow-up");

        let follow_up = LlmRequest {
            messages: history.messages().to_vec(),
            tools: Vec::new(),
            user: request.user_id,
        };
        match self.ask(follow_up, request.mode, sink).await {
            Ok(reply) => match reply.content.filter(|t| !t.trim().is_empty()) {
                Some(text) => {
                    if request.mode == TurnMode::NonStreaming {
                        sink.emit(TurnEvent::text(text.clone())).await;
                    }
                    history.push(Message::assistant(Some(text), Vec::new()));
                }
                None => info!("Follow-up reply had no text"),
            },
            Err(e) => {
                error!(error = ?e, "Follow-up backend call failed");
                sink.emit(TurnEvent::error(BACKEND_FAILURE, "backend")).await;
            }
        }
    }

    /// Execute one requested call and return the history content for it.
    async fn run_tool_call(&self, call: &ToolCall, sink: &EventSink) -> String {
        let name = call.function.name.as_str();
        let raw = call.function.arguments.as_str();

        let Some(arguments) = parse_arguments(raw) else {
            error!(tool = %name, tool_call_id = %call.id, arguments = %raw, "Tool arguments are not a JSON object");
            sink.emit(TurnEvent::notice(format!(
                "Couldn't understand arguments for tool `{name}`. The model provided malformed JSON: `{raw}`"
            )))
            .await;
            return format!(
                "Error: Invalid JSON object arguments provided for tool \"{name}\". LLM sent: {raw}"
            );
        };

        info!(tool = %name, tool_call_id = %call.id, "Executing tool");
        let result = self.router.execute(name, arguments).await;
        let content = format_result(&result);

        sink.emit(TurnEvent::ToolResult {
            id: call.id.clone(),
            name: name.to_string(),
            content: content.clone(),
            success: result.is_ok(),
        })
        .await;
        content
    }

    /// One backend round trip. Streaming text is forwarded as it arrives.
    async fn ask(
        &self,
        request: LlmRequest,
        mode: TurnMode,
        sink: &EventSink,
    ) -> anyhow::Result<LlmResponse> {
        match mode {
            TurnMode::NonStreaming => self.driver.complete(request).await,
            TurnMode::Streaming => {
                let mut stream = self.driver.stream(request).await?;
                let mut text = String::new();
                let mut calls = ToolCallAggregator::new();

                while let Some(delta) = stream.next().await {
                    match delta? {
                        ChatDelta::Content(chunk) => {
                            text.push_str(&chunk);
                            sink.emit(TurnEvent::text(chunk)).await;
                        }
                        ChatDelta::ToolCall(fragment) => calls.apply(fragment),
                    }
                }

                Ok(LlmResponse {
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: calls.finish(),
                })
            }
        }
    }
}

/// Tool arguments must be a JSON object.
fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) | Err(_) => {
            warn!(arguments = %raw, "Rejecting tool arguments");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments("{\"city\":\"NY\"}").is_some());
        assert!(parse_arguments("{}").is_some());
        assert!(parse_arguments("[1,2]").is_none());
        assert!(parse_arguments("\"str\"").is_none());
        assert!(parse_arguments("{not json").is_none());
        assert!(parse_arguments("").is_none());
    }
}
