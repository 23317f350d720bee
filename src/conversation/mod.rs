//! Multi-turn conversations with tool use.
//!
//! - [`history`]: per-conversation message history and its store
//! - [`engine`]: the turn engine that talks to the backend and the tools

pub mod engine;
pub mod history;

pub use engine::{ConversationEngine, TurnMode, TurnRequest};
pub use history::{ConversationStore, History};
