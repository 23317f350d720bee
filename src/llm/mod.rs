//! Reasoning backend drivers.
//!
//! The [`LlmDriver`] trait is the engine's only view of the language model.
//! It offers a one-shot completion and a streaming completion that yields
//! ordered [`ChatDelta`]s; partial tool calls in the stream are folded back
//! together with a [`ToolCallAggregator`].
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: OpenAI-compatible Chat Completions
//!   (`POST {base_url}/chat/completions`), e.g. a local LM Studio or vLLM.

pub mod aggregate;
pub mod chat_completions;

pub use aggregate::ToolCallAggregator;
pub use chat_completions::ChatCompletionsDriver;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Backend endpoint and chat parameters.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL including the API prefix (e.g. `http://localhost:1234/v1`).
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .finish()
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content; `None` for assistant messages that only call tools.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls made by the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool call this message answers (role `tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name (role `tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    /// An assistant message. Empty `tool_calls` are left off the wire.
    #[must_use]
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    #[must_use]
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Tool response.
    Tool,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Type of tool (always "function" for now).
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function details.
    pub function: ToolCallFunction,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function details in a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as JSON string.
    pub arguments: String,
}

/// Request to an LLM driver.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Available tools in `OpenAI` function schema format. Sent with
    /// `tool_choice: auto` when non-empty.
    pub tools: Vec<serde_json::Value>,
    /// End-user identifier forwarded to the backend.
    pub user: Option<String>,
}

/// A complete (non-streaming) backend reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub content: Option<String>,
    /// Only calls that carry both an id and a function name.
    pub tool_calls: Vec<ToolCall>,
}

/// One piece of a streamed tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Stream slot the fragment belongs to.
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One element of a streaming reply, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDelta {
    Content(String),
    ToolCall(ToolCallFragment),
}

/// Finite, non-restartable stream of deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<ChatDelta>> + Send>>;

/// Trait for reasoning backends.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Request a complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply cannot be read.
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse>;

    /// Stream a reply as ordered deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; mid-stream failures surface as
    /// stream items.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream>;
}
