//! Renders tool outcomes as plain text for the conversation history.

use tracing::warn;

use crate::mcp::router::ToolError;
use crate::mcp::types::{ToolContent, ToolInvocationResult};

pub const EMPTY_RESULT_MESSAGE: &str = "Tool executed successfully but returned no content.";

const DIAGNOSTIC_LIMIT: usize = 200;

/// Render the outcome of [`ToolRouter::execute`](crate::mcp::router::ToolRouter::execute).
pub fn format_result(result: &Result<ToolInvocationResult, ToolError>) -> String {
    match result {
        Ok(result) => format_content(&result.content),
        Err(e) => format!("Tool Error: {e}"),
    }
}

pub fn format_content(content: &ToolContent) -> String {
    match content {
        ToolContent::Empty => {
            warn!("Tool returned no content");
            EMPTY_RESULT_MESSAGE.to_string()
        }
        ToolContent::Text(text) | ToolContent::TextBlock(text) => text.clone(),
        ToolContent::Primitive(value) => value.to_string(),
        ToolContent::Structured(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        ToolContent::Unknown(raw) => {
            warn!("Unexpected tool result format");
            let preview: String = raw.chars().take(DIAGNOSTIC_LIMIT).collect();
            format!("Unexpected tool result format: {preview}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(content: ToolContent) -> Result<ToolInvocationResult, ToolError> {
        Ok(ToolInvocationResult::success(content))
    }

    #[test]
    fn test_text_block_and_primitives() {
        let block = ToolContent::from_value(json!({"type": "text", "text": "42"}));
        assert_eq!(format_result(&ok(block)), "42");
        assert_eq!(format_result(&ok(ToolContent::Primitive(json!(3.5)))), "3.5");
        assert_eq!(format_result(&ok(ToolContent::Primitive(json!(true)))), "true");
        assert_eq!(format_result(&ok(ToolContent::Text("plain".into()))), "plain");
    }

    #[test]
    fn test_empty_content_message() {
        assert_eq!(format_result(&ok(ToolContent::Empty)), EMPTY_RESULT_MESSAGE);
    }

    #[test]
    fn test_structured_is_pretty_json() {
        let rendered = format_result(&ok(ToolContent::Structured(json!({"a": [1, 2]}))));
        assert_eq!(rendered, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn test_errors_are_prefixed() {
        let err = Err(ToolError::Timeout { tool: "slow".into() });
        assert_eq!(format_result(&err), "Tool Error: Tool call \"slow\" timed out.");
    }

    #[test]
    fn test_unknown_is_truncated() {
        let raw = "x".repeat(500);
        let rendered = format_result(&ok(ToolContent::Unknown(raw)));
        assert_eq!(
            rendered.len(),
            "Unexpected tool result format: ".len() + DIAGNOSTIC_LIMIT
        );
    }
}
