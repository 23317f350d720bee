//! Per-server connection supervisor.
//!
//! Each configured server gets one long-lived task that walks
//! `Disconnected -> Connecting -> Listing -> Ready` and falls back to
//! `Disconnected` on any fault, retrying with exponential backoff. Every
//! wait observes the shutdown token, so a stop request is seen within one
//! step.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mcp::connection::{ToolConnection, ToolConnector};
use crate::mcp::registry::ToolRegistry;
use crate::mcp::types::ServerEndpoint;

/// Bound on opening a session and on listing its tools.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);
/// First reconnect delay, also used after any successful connection.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(15);
/// Upper bound for the reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Timing knobs for a supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimings {
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

/// Doubling reconnect delay with a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Lifecycle phase of a supervisor, as published to status readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Disconnected,
    Connecting,
    Listing,
    Ready,
    Terminated,
}

enum Step {
    Retry,
    Shutdown,
}

/// Owns the connection lifecycle of one server.
pub struct Supervisor {
    endpoint: ServerEndpoint,
    connector: Arc<dyn ToolConnector>,
    registry: Arc<ToolRegistry>,
    shutdown: CancellationToken,
    timings: SupervisorTimings,
    phase: watch::Sender<SupervisorPhase>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("endpoint", &self.endpoint)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor and register its server with the registry.
    pub fn new(
        endpoint: ServerEndpoint,
        connector: Arc<dyn ToolConnector>,
        registry: Arc<ToolRegistry>,
        shutdown: CancellationToken,
        timings: SupervisorTimings,
    ) -> (Self, watch::Receiver<SupervisorPhase>) {
        registry.register(endpoint.name.clone());
        let (phase, phase_rx) = watch::channel(SupervisorPhase::Disconnected);
        let supervisor = Self {
            endpoint,
            connector,
            registry,
            shutdown,
            timings,
            phase,
        };
        (supervisor, phase_rx)
    }

    /// Run until the shutdown token fires.
    pub async fn run(self) {
        let name = self.endpoint.name.clone();
        let mut backoff = Backoff::new(self.timings.initial_backoff, self.timings.max_backoff);

        while !self.shutdown.is_cancelled() {
            info!(server = %name, url = %self.endpoint.url, "Connecting to MCP server");

            if let Step::Shutdown = self.connect_once(&mut backoff).await {
                break;
            }

            if self.registry.evict(&name) {
                debug!(server = %name, "Evicted stale registry entry");
            }
            self.set_phase(SupervisorPhase::Disconnected);

            let delay = backoff.next_delay();
            info!(server = %name, delay_secs = delay.as_secs(), "Waiting before reconnecting");
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!(server = %name, "Shutdown signaled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.registry.evict(&name);
        self.set_phase(SupervisorPhase::Terminated);
        info!(server = %name, "Connection supervisor finished");
    }

    async fn connect_once(&self, backoff: &mut Backoff) -> Step {
        let name = self.endpoint.name.as_str();

        self.set_phase(SupervisorPhase::Connecting);
        let connection = tokio::select! {
            () = self.shutdown.cancelled() => return Step::Shutdown,
            res = timeout(self.timings.connect_timeout, self.connector.connect(&self.endpoint)) => match res {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    warn!(server = %name, error = %e, "Connection to MCP server failed");
                    return Step::Retry;
                }
                Err(_) => {
                    error!(server = %name, "Timed out connecting to MCP server");
                    return Step::Retry;
                }
            }
        };

        self.set_phase(SupervisorPhase::Listing);
        let tools = tokio::select! {
            () = self.shutdown.cancelled() => {
                connection.close().await;
                return Step::Shutdown;
            }
            res = timeout(self.timings.connect_timeout, connection.list_tools()) => match res {
                Ok(Ok(tools)) => tools,
                Ok(Err(e)) => {
                    warn!(server = %name, error = %e, "Listing tools failed");
                    connection.close().await;
                    return Step::Retry;
                }
                Err(_) => {
                    error!(server = %name, "Timed out listing tools");
                    connection.close().await;
                    return Step::Retry;
                }
            }
        };

        let tool_count = tools.len();
        let Some(generation) = self
            .registry
            .publish(name, Arc::clone(&connection), tools)
        else {
            error!(server = %name, "Server is not registered; dropping connection");
            connection.close().await;
            return Step::Retry;
        };

        backoff.reset();
        self.set_phase(SupervisorPhase::Ready);
        info!(server = %name, tool_count, generation, "Connected to MCP server and listed tools");

        self.wait_ready(connection.as_ref(), generation).await
    }

    /// Idle in `Ready` until shutdown or until the router invalidates us.
    async fn wait_ready(&self, connection: &dyn ToolConnection, generation: u64) -> Step {
        let name = self.endpoint.name.as_str();
        let invalidated: Arc<Notify> = self
            .registry
            .invalidation_signal(name)
            .unwrap_or_default();

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!(server = %name, "Shutdown signal received");
                    connection.close().await;
                    return Step::Shutdown;
                }
                () = invalidated.notified() => {
                    if !self.registry.is_current(name, generation) {
                        warn!(server = %name, generation, "Connection invalidated; reconnecting");
                        connection.close().await;
                        return Step::Retry;
                    }
                }
            }
        }
    }

    fn set_phase(&self, phase: SupervisorPhase) {
        self.phase.send_replace(phase);
    }
}
