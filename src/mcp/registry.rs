//! Shared registry of live tool-provider connections and their tool sets.
//!
//! Every mutation of a server's entry happens under one write lock, so a
//! reader sees either the full previous `{connection, tools}` pair or the
//! full new one. Servers keep their registration order, which is the order
//! the router and schema formatter iterate in.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::mcp::connection::ToolConnection;
use crate::mcp::types::ToolDefinition;

/// A connected server as seen by readers.
#[derive(Clone)]
pub struct LiveServer {
    pub name: String,
    pub connection: Arc<dyn ToolConnection>,
    /// Identifies this particular connection; bumps on every publish.
    pub generation: u64,
    pub tools: Option<Arc<Vec<ToolDefinition>>>,
}

impl std::fmt::Debug for LiveServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveServer")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("tool_count", &self.tools.as_ref().map(|t| t.len()))
            .finish()
    }
}

impl LiveServer {
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|t| t.name == name))
    }
}

/// Point-in-time view of one registered server, for status reporting.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub name: String,
    pub connected: bool,
    pub tools: Option<Arc<Vec<ToolDefinition>>>,
    pub connected_since: Option<DateTime<Utc>>,
}

struct Slot {
    name: String,
    connection: Option<(Arc<dyn ToolConnection>, u64)>,
    tools: Option<Arc<Vec<ToolDefinition>>>,
    connected_since: Option<DateTime<Utc>>,
    invalidated: Arc<Notify>,
}

impl Slot {
    fn new(name: String) -> Self {
        Self {
            name,
            connection: None,
            tools: None,
            connected_since: None,
            invalidated: Arc::new(Notify::new()),
        }
    }

    fn clear(&mut self) -> bool {
        let had_entry = self.connection.is_some() || self.tools.is_some();
        self.connection = None;
        self.tools = None;
        self.connected_since = None;
        had_entry
    }
}

#[derive(Default)]
struct Inner {
    slots: Vec<Slot>,
    /// tool name -> server that most recently published it; survives eviction.
    observed: HashMap<String, String>,
    next_generation: u64,
}

impl Inner {
    fn slot_mut(&mut self, server: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.name == server)
    }
}

/// Registry of connections and tool sets keyed by server name.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ToolRegistry")
            .field("server_count", &inner.slots.len())
            .field(
                "connected_count",
                &inner.slots.iter().filter(|s| s.connection.is_some()).count(),
            )
            .finish()
    }
}

impl ToolRegistry {
    /// Create a registry with servers registered in the given order.
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::default();
        for name in servers {
            registry.register(name);
        }
        registry
    }

    /// Register a server name. Registering twice keeps the original position.
    pub fn register(&self, server: impl Into<String>) {
        let server = server.into();
        let mut inner = self.inner.write();
        if inner.slots.iter().all(|s| s.name != server) {
            inner.slots.push(Slot::new(server));
        }
    }

    /// Atomically install a connection and its tool set.
    ///
    /// Returns the generation of the new connection, or `None` when the
    /// server was never registered.
    pub fn publish(
        &self,
        server: &str,
        connection: Arc<dyn ToolConnection>,
        tools: Vec<ToolDefinition>,
    ) -> Option<u64> {
        let mut inner = self.inner.write();
        if inner.slots.iter().all(|s| s.name != server) {
            return None;
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;

        inner.observed.retain(|_, owner| owner.as_str() != server);
        for tool in &tools {
            inner.observed.insert(tool.name.clone(), server.to_string());
        }

        let slot = inner.slot_mut(server)?;
        slot.connection = Some((connection, generation));
        slot.tools = Some(Arc::new(tools));
        slot.connected_since = Some(Utc::now());
        Some(generation)
    }

    /// Drop the connection and tool set of a server, whatever its generation.
    pub fn evict(&self, server: &str) -> bool {
        self.inner
            .write()
            .slot_mut(server)
            .is_some_and(Slot::clear)
    }

    /// Evict a server only if `generation` is still its live connection, and
    /// wake its supervisor.
    pub fn invalidate(&self, server: &str, generation: u64) -> bool {
        let mut inner = self.inner.write();
        let Some(slot) = inner.slot_mut(server) else {
            return false;
        };
        if slot.connection.as_ref().map(|(_, g)| *g) != Some(generation) {
            return false;
        }
        slot.clear();
        slot.invalidated.notify_one();
        true
    }

    /// Whether `generation` is still the live connection of `server`.
    pub fn is_current(&self, server: &str, generation: u64) -> bool {
        self.inner
            .read()
            .slots
            .iter()
            .any(|s| s.name == server && s.connection.as_ref().map(|(_, g)| *g) == Some(generation))
    }

    /// Signal fired when the router invalidates this server's connection.
    pub fn invalidation_signal(&self, server: &str) -> Option<Arc<Notify>> {
        self.inner
            .read()
            .slots
            .iter()
            .find(|s| s.name == server)
            .map(|s| Arc::clone(&s.invalidated))
    }

    /// Connected servers in registration order.
    pub fn live_servers(&self) -> Vec<LiveServer> {
        self.inner
            .read()
            .slots
            .iter()
            .filter_map(|s| {
                let (connection, generation) = s.connection.as_ref()?;
                Some(LiveServer {
                    name: s.name.clone(),
                    connection: Arc::clone(connection),
                    generation: *generation,
                    tools: s.tools.clone(),
                })
            })
            .collect()
    }

    pub fn has_connections(&self) -> bool {
        self.inner.read().slots.iter().any(|s| s.connection.is_some())
    }

    /// Server whose latest tool set contains `tool`, connected or not.
    pub fn observed_owner(&self, tool: &str) -> Option<String> {
        self.inner.read().observed.get(tool).cloned()
    }

    pub fn snapshot(&self) -> Vec<ServerSnapshot> {
        self.inner
            .read()
            .slots
            .iter()
            .map(|s| ServerSnapshot {
                name: s.name.clone(),
                connected: s.connection.is_some(),
                tools: s.tools.clone(),
                connected_since: s.connected_since,
            })
            .collect()
    }

    /// Evict every server. Registration and observed names are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        for slot in &mut inner.slots {
            slot.clear();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mcp::connection::ConnectionError;
    use crate::mcp::types::ToolInvocationResult;
    use async_trait::async_trait;

    #[derive(Debug)]
    pub(crate) struct NullConnection;

    #[async_trait]
    impl ToolConnection for NullConnection {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ConnectionError> {
            Ok(Vec::new())
        }

        async fn invoke(
            &self,
            _name: &str,
            _arguments: serde_json::Map<String, serde_json::Value>,
        ) -> Result<ToolInvocationResult, ConnectionError> {
            Err(ConnectionError::Protocol("null connection".into()))
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_publish_and_evict() {
        let registry = ToolRegistry::new(["alpha", "beta"]);
        assert!(!registry.has_connections());

        let generation = registry
            .publish("beta", Arc::new(NullConnection), vec![ToolDefinition::new("echo")])
            .unwrap();
        assert!(registry.is_current("beta", generation));

        let live = registry.live_servers();
        assert_eq!(live.len(), 1);
        assert!(live[0].has_tool("echo"));

        assert!(registry.evict("beta"));
        assert!(!registry.has_connections());
        assert_eq!(registry.observed_owner("echo").as_deref(), Some("beta"));
        assert!(!registry.evict("beta"));
    }

    #[test]
    fn test_unregistered_server_is_rejected() {
        let registry = ToolRegistry::new(["alpha"]);
        assert!(registry.publish("ghost", Arc::new(NullConnection), Vec::new()).is_none());
        assert!(!registry.has_connections());
    }

    #[test]
    fn test_stale_invalidation_is_ignored() {
        let registry = ToolRegistry::new(["alpha"]);
        let first = registry
            .publish("alpha", Arc::new(NullConnection), Vec::new())
            .unwrap();
        let second = registry
            .publish("alpha", Arc::new(NullConnection), Vec::new())
            .unwrap();

        assert!(!registry.invalidate("alpha", first));
        assert!(registry.is_current("alpha", second));
        assert!(registry.invalidate("alpha", second));
        assert!(!registry.has_connections());
    }

    #[test]
    fn test_registration_order_is_kept() {
        let registry = ToolRegistry::new(["zeta", "alpha"]);
        registry.register("zeta");
        registry.publish("alpha", Arc::new(NullConnection), Vec::new());
        registry.publish("zeta", Arc::new(NullConnection), Vec::new());

        let names: Vec<_> = registry.live_servers().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }
}
