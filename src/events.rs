//! Events emitted by a conversation turn.
//!
//! A turn produces an ordered sequence of [`TurnEvent`]s ending in
//! [`TurnEvent::Done`]. The HTTP layer either collects them into a JSON
//! array or forwards them as Server-Sent Events.
//!
//! # Example
//!
//! ```rust
//! use mcp_chat_relay::events::{TurnEvent, sse_event};
//!
//! let event = TurnEvent::Text {
//!     text: "Hello".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert!(sse.contains("event: text"));
//! ```

use serde::{Deserialize, Serialize};

/// One observable step of a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum TurnEvent {
    /// Assistant text.
    #[serde(rename = "text")]
    Text { text: String },

    /// Rendered outcome of one tool call.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Tool call ID this result corresponds to.
        id: String,
        name: String,
        content: String,
        success: bool,
    },

    /// Something the caller should know that did not stop the turn.
    #[serde(rename = "notice")]
    Notice { message: String },

    /// The turn failed.
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The turn is over.
    #[serde(rename = "done")]
    Done,
}

impl TurnEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>, code: &str) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }
}

/// Convert a [`TurnEvent`] to an SSE-formatted string.
pub fn sse_event(evt: &TurnEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "data": { "message": e.to_string() } }).to_string()
    });

    format!("event: {}\ndata: {json}\n\n", event_name(evt))
}

/// Get the SSE event name for a [`TurnEvent`].
pub fn event_name(evt: &TurnEvent) -> &'static str {
    match evt {
        TurnEvent::Text { .. } => "text",
        TurnEvent::ToolResult { .. } => "tool_result",
        TurnEvent::Notice { .. } => "notice",
        TurnEvent::Error { .. } => "error",
        TurnEvent::Done => "done",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_value(TurnEvent::ToolResult {
            id: "call_1".into(),
            name: "echo".into(),
            content: "42".into(),
            success: true,
        })
        .unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["data"]["content"], "42");

        let done = serde_json::to_string(&TurnEvent::Done).unwrap();
        assert_eq!(done, r#"{"type":"done"}"#);
    }

    #[test]
    fn test_sse_framing() {
        let sse = sse_event(&TurnEvent::error("boom", "backend"));
        assert!(sse.starts_with("event: error\ndata: {"));
        assert!(sse.ends_with("\n\n"));
        assert!(sse.contains(r#""code":"backend""#));
    }
}
