//! MCP Chat Relay
//!
//! A chat relay that lets an OpenAI-compatible model call tools published by
//! remote Model Context Protocol servers.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP API with JSON and SSE responses
//! - **Conversations**: per-conversation history and the turn engine
//! - **LLM**: Chat Completions driver, blocking or streamed
//! - **MCP**: supervised server sessions, a shared tool registry and a router
//!
//! # Modules
//!
//! - [`config`]: layered application configuration
//! - [`conversation`]: history store and turn engine
//! - [`events`]: events emitted by a turn
//! - [`llm`]: LLM driver trait and implementation
//! - [`mcp`]: MCP connections, registry and routing
//! - [`shutdown`]: bounded shutdown of background tasks

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod conversation;
pub mod events;
pub mod llm;
pub mod mcp;
pub mod server;
pub mod shutdown;
pub mod telemetry;

use conversation::{ConversationEngine, TurnMode};
use mcp::McpHub;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Turn engine and conversation histories.
    pub engine: ConversationEngine,
    /// MCP supervisors and their tool registry.
    pub hub: Arc<McpHub>,
    /// Mode used when a request does not choose one.
    pub default_mode: TurnMode,
}
