//! Resolves tool names to live servers and executes calls with failure
//! isolation.
//!
//! Resolution is first-match: servers are scanned in registration order and
//! the first connected server whose tool set contains the name wins. A name
//! published by several servers therefore always routes to the one that was
//! configured first.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::mcp::connection::ConnectionError;
use crate::mcp::registry::{LiveServer, ToolRegistry};
use crate::mcp::types::{ToolContent, ToolInvocationResult};

/// Bound on a single tool invocation.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Structured failure of a tool call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("{}", not_found_message(.tool, .any_connected))]
    NotFound { tool: String, any_connected: bool },

    #[error(
        "Tool \"{tool}\" exists (on server \"{server}\"), but the server is currently disconnected or unavailable."
    )]
    Unavailable { tool: String, server: String },

    #[error("Tool call \"{tool}\" timed out.")]
    Timeout { tool: String },

    #[error(
        "Connection error executing tool \"{tool}\". The server may be temporarily unavailable. Please try again."
    )]
    ConnectionFault { tool: String, server: String },

    #[error("Tool reported error code {code}{}", reported_detail(.content))]
    Reported { code: i64, content: ToolContent },

    #[error("Error calling tool \"{tool}\": {message}")]
    CallFailed { tool: String, message: String },
}

fn not_found_message(tool: &str, any_connected: &bool) -> String {
    if *any_connected {
        format!("Tool \"{tool}\" not found on any configured and connected MCP server.")
    } else {
        format!("Tool \"{tool}\" cannot be executed: No MCP servers currently connected.")
    }
}

fn reported_detail(content: &ToolContent) -> String {
    if content.is_empty() {
        String::new()
    } else {
        format!(": {content}")
    }
}

/// Executes tool calls against whichever server currently owns the name.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    invoke_timeout: Duration,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            invoke_timeout: INVOKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_invoke_timeout(mut self, invoke_timeout: Duration) -> Self {
        self.invoke_timeout = invoke_timeout;
        self
    }

    /// Find the live server that owns `name`.
    pub fn resolve(&self, name: &str) -> Result<LiveServer, ToolError> {
        let live = self.registry.live_servers();
        if let Some(server) = live.iter().find(|s| s.has_tool(name)) {
            return Ok(server.clone());
        }

        if let Some(owner) = self
            .registry
            .observed_owner(name)
            .filter(|owner| live.iter().all(|s| &s.name != owner))
        {
            return Err(ToolError::Unavailable {
                tool: name.to_string(),
                server: owner,
            });
        }

        Err(ToolError::NotFound {
            tool: name.to_string(),
            any_connected: !live.is_empty(),
        })
    }

    /// Execute one tool call. Never retries.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolInvocationResult, ToolError> {
        let server = self.resolve(name).inspect_err(|e| {
            warn!(tool = %name, error = %e, "Tool is not routable");
        })?;

        info!(tool = %name, server = %server.name, "Calling tool");

        let outcome = timeout(self.invoke_timeout, server.connection.invoke(name, arguments)).await;

        match outcome {
            Err(_) | Ok(Err(ConnectionError::Timeout)) => {
                error!(tool = %name, server = %server.name, "Tool call timed out");
                Err(ToolError::Timeout {
                    tool: name.to_string(),
                })
            }
            Ok(Err(ConnectionError::Connect(message))) => {
                error!(
                    tool = %name,
                    server = %server.name,
                    error = %message,
                    "Connection error during tool call"
                );
                if self.registry.invalidate(&server.name, server.generation) {
                    info!(server = %server.name, "Evicted faulty connection");
                }
                Err(ToolError::ConnectionFault {
                    tool: name.to_string(),
                    server: server.name,
                })
            }
            Ok(Err(ConnectionError::Protocol(message))) => {
                warn!(tool = %name, server = %server.name, error = %message, "Tool call failed");
                Err(ToolError::CallFailed {
                    tool: name.to_string(),
                    message,
                })
            }
            Ok(Ok(result)) if !result.is_success() => {
                let code = result.error_code.unwrap_or_default();
                warn!(tool = %name, server = %server.name, code, "Tool reported an error");
                Err(ToolError::Reported {
                    code,
                    content: result.content,
                })
            }
            Ok(Ok(result)) => {
                debug!(tool = %name, server = %server.name, "Tool call succeeded");
                Ok(result)
            }
        }
    }
}
