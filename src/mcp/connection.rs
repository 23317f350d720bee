//! Boundary traits for tool-provider sessions.
//!
//! The supervisor and router only ever talk to a server through these
//! traits, so the MCP transport can be swapped (or faked in tests).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::mcp::types::{ServerEndpoint, ToolDefinition, ToolInvocationResult};

/// Failures reported by a tool-provider session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The transport could not be opened or broke mid-call.
    #[error("connection error: {0}")]
    Connect(String),

    /// The server did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The server answered, but not with something usable.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A live session with one tool-provider server.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// Fetch the server's tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ConnectionError>;

    /// Invoke a tool by name.
    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolInvocationResult, ConnectionError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self);
}

/// Opens sessions to tool-provider servers.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Arc<dyn ToolConnection>, ConnectionError>;
}
