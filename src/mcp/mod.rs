//! Model Context Protocol (MCP) tool providers.
//!
//! Remote MCP servers are reached over streamable HTTP. Each configured
//! server is owned by a [`supervisor::Supervisor`] that keeps a session open
//! and publishes its tool catalog into the shared [`registry::ToolRegistry`].
//! The [`router::ToolRouter`] executes calls against whatever is live.
//!
//! # Configuration
//!
//! ```yaml
//! mcp:
//!   servers:
//!     - name: time
//!       url: http://localhost:8001/mcp
//!     - name: search
//!       url: https://search.example.com/mcp?key=${SEARCH_API_KEY}
//! ```
//!
//! # Tool names
//!
//! Tool names are not namespaced. When two servers publish the same name,
//! the server listed first wins.

pub mod client;
pub mod config;
pub mod connection;
pub mod format;
pub mod hub;
pub mod registry;
pub mod router;
pub mod schema;
pub mod supervisor;
pub mod types;

pub use client::RmcpConnector;
pub use connection::{ConnectionError, ToolConnection, ToolConnector};
pub use hub::{McpHub, ServerState, StatusReport, StatusSummary};
pub use registry::ToolRegistry;
pub use router::{ToolError, ToolRouter};
pub use types::{ServerEndpoint, ToolContent, ToolDefinition, ToolInvocationResult, ToolParameter};
