//! Entry point for the tool-provider side of the relay.
//!
//! [`McpHub`] starts one supervisor per configured server, hands out the
//! router that the conversation engine executes tools through, answers the
//! status query, and stops everything on shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::mcp::connection::ToolConnector;
use crate::mcp::registry::{ServerSnapshot, ToolRegistry};
use crate::mcp::router::ToolRouter;
use crate::mcp::supervisor::{Supervisor, SupervisorPhase, SupervisorTimings};
use crate::mcp::types::ServerEndpoint;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};

/// Tools listed per server in a status report.
pub const PREVIEW_TOOL_LIMIT: usize = 7;
/// Characters of each tool description kept in a status report.
pub const PREVIEW_DESCRIPTION_LIMIT: usize = 100;

/// Coarse health of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Connected and tools listed.
    Ready,
    /// Connected, but no tool set is available.
    ///
    /// Supervisors publish a connection together with its tool set and treat
    /// a failed listing as a failed connect, so a supervised server never
    /// reports this state. It is derived only from registry snapshots that
    /// carry a connection without tools.
    Degraded,
    Connecting,
    Disconnected,
    Unknown,
}

impl ServerState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ready => "Connected & Tools Listed",
            Self::Degraded => "Connected (Listing Tools Failed?)",
            Self::Connecting => "Connecting / Initializing...",
            Self::Disconnected => "Disconnected / Unavailable",
            Self::Unknown => "Unknown State",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPreview {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub state: ServerState,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
    pub total_tools: usize,
    /// At most [`PREVIEW_TOOL_LIMIT`] tools.
    pub tools: Vec<ToolPreview>,
    /// Tools left out of the preview.
    pub more_tools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSummary {
    NoServersConfigured,
    /// Nothing connected yet, but supervisors are still trying.
    Connecting,
    NoneConnected,
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub summary: StatusSummary,
    pub servers: Vec<ServerStatus>,
}

/// Owns the registry, the supervisors and their shutdown.
pub struct McpHub {
    registry: Arc<ToolRegistry>,
    router: ToolRouter,
    phases: Vec<(String, watch::Receiver<SupervisorPhase>)>,
    coordinator: ShutdownCoordinator,
}

impl std::fmt::Debug for McpHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpHub")
            .field("registry", &self.registry)
            .field("server_count", &self.phases.len())
            .finish()
    }
}

impl McpHub {
    /// Register every endpoint and spawn its supervisor.
    pub fn start(endpoints: Vec<ServerEndpoint>, connector: Arc<dyn ToolConnector>) -> Self {
        Self::start_with(
            endpoints,
            connector,
            SupervisorTimings::default(),
            ShutdownCoordinator::new(),
        )
    }

    pub fn start_with(
        endpoints: Vec<ServerEndpoint>,
        connector: Arc<dyn ToolConnector>,
        timings: SupervisorTimings,
        coordinator: ShutdownCoordinator,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::new(endpoints.iter().map(|e| e.name.clone())));
        let mut phases = Vec::with_capacity(endpoints.len());

        if endpoints.is_empty() {
            info!("No MCP servers configured");
        }

        for endpoint in endpoints {
            let name = endpoint.name.clone();
            info!(server = %name, url = %endpoint.url, "Starting connection supervisor");
            let (supervisor, phase) = Supervisor::new(
                endpoint,
                Arc::clone(&connector),
                Arc::clone(&registry),
                coordinator.token(),
                timings,
            );
            coordinator.spawn(format!("mcp_conn_{name}"), supervisor.run());
            phases.push((name, phase));
        }

        Self {
            router: ToolRouter::new(Arc::clone(&registry)),
            registry,
            phases,
            coordinator,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn router(&self) -> ToolRouter {
        self.router.clone()
    }

    /// Per-server state and tool preview, in configured order.
    pub fn status(&self) -> StatusReport {
        let snapshots = self.registry.snapshot();

        let servers: Vec<ServerStatus> = snapshots
            .iter()
            .map(|snapshot| {
                let phase = self
                    .phases
                    .iter()
                    .find(|(name, _)| *name == snapshot.name)
                    .map(|(_, rx)| *rx.borrow());
                server_status(snapshot, phase)
            })
            .collect();

        let summary = if servers.is_empty() {
            StatusSummary::NoServersConfigured
        } else if servers
            .iter()
            .any(|s| matches!(s.state, ServerState::Ready | ServerState::Degraded))
        {
            StatusSummary::Ok
        } else if self
            .phases
            .iter()
            .any(|(_, rx)| *rx.borrow() != SupervisorPhase::Terminated)
        {
            StatusSummary::Connecting
        } else {
            StatusSummary::NoneConnected
        };

        StatusReport { summary, servers }
    }

    /// Stop every supervisor and drop all connections.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.coordinator.shutdown().await;
        self.registry.clear();
        report
    }
}

fn server_status(snapshot: &ServerSnapshot, phase: Option<SupervisorPhase>) -> ServerStatus {
    let state = match (snapshot.connected, snapshot.tools.is_some(), phase) {
        (true, true, _) => ServerState::Ready,
        (true, false, _) => ServerState::Degraded,
        (false, _, Some(SupervisorPhase::Connecting | SupervisorPhase::Listing)) => {
            ServerState::Connecting
        }
        (false, _, Some(_)) => ServerState::Disconnected,
        (false, _, None) => ServerState::Unknown,
    };

    let tools = snapshot.tools.as_deref().map(Vec::as_slice).unwrap_or_default();
    let preview = tools
        .iter()
        .take(PREVIEW_TOOL_LIMIT)
        .enumerate()
        .map(|(i, tool)| ToolPreview {
            name: if tool.name.is_empty() {
                format!("Unnamed Tool {}", i + 1)
            } else {
                tool.name.clone()
            },
            description: preview_description(tool.description.as_deref()),
        })
        .collect();

    ServerStatus {
        name: snapshot.name.clone(),
        state,
        label: state.label(),
        connected_since: snapshot.connected_since,
        total_tools: tools.len(),
        tools: preview,
        more_tools: tools.len().saturating_sub(PREVIEW_TOOL_LIMIT),
    }
}

fn preview_description(description: Option<&str>) -> String {
    let description = description.filter(|d| !d.is_empty()).unwrap_or("No description");
    if description.chars().count() > PREVIEW_DESCRIPTION_LIMIT {
        let cut: String = description.chars().take(PREVIEW_DESCRIPTION_LIMIT).collect();
        format!("{cut}...")
    } else {
        description.to_string()
    }
}
