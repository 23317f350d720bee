//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use mcp_chat_relay::conversation::{ConversationEngine, ConversationStore};
use mcp_chat_relay::llm::{ChatDelta, DeltaStream, LlmDriver, LlmRequest, LlmResponse, ToolCall};
use mcp_chat_relay::mcp::{
    ConnectionError, ServerEndpoint, ToolConnection, ToolConnector, ToolContent, ToolDefinition,
    ToolInvocationResult, ToolParameter, ToolRegistry, ToolRouter,
};

pub const SYSTEM_MESSAGE: &str = "You are a test assistant.";

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(LlmResponse),
    Stream(Vec<ChatDelta>),
    Fail(String),
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Reply(LlmResponse {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
        })
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self::Reply(LlmResponse {
            content: None,
            tool_calls: calls,
        })
    }
}

/// Backend that replays steps in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedDriver {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Hold every call open for `delay` so overlapping calls can be observed.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn next_step(&self, req: LlmRequest) -> Step {
        self.requests.lock().push(req);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| Step::Fail("script exhausted".to_string()))
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse> {
        match self.next_step(req).await {
            Step::Reply(resp) => Ok(resp),
            Step::Stream(_) => anyhow::bail!("expected a blocking call"),
            Step::Fail(msg) => anyhow::bail!(msg),
        }
    }

    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream> {
        match self.next_step(req).await {
            Step::Stream(deltas) => Ok(Box::pin(stream::iter(deltas.into_iter().map(Ok)))),
            Step::Reply(_) => anyhow::bail!("expected a streaming call"),
            Step::Fail(msg) => anyhow::bail!(msg),
        }
    }
}

/// Backend that panics on every call.
#[derive(Debug, Default)]
pub struct PanickingDriver;

#[async_trait]
impl LlmDriver for PanickingDriver {
    async fn complete(&self, _req: LlmRequest) -> anyhow::Result<LlmResponse> {
        panic!("backend client bug");
    }

    async fn stream(&self, _req: LlmRequest) -> anyhow::Result<DeltaStream> {
        panic!("backend client bug");
    }
}

/// Calculator server exposing `add` and `echo`.
#[derive(Debug, Default)]
pub struct CalcConnection {
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl CalcConnection {
    pub fn tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("add")
                .with_description("Add two numbers")
                .with_parameter(ToolParameter::new("a", "number").required())
                .with_parameter(ToolParameter::new("b", "number").required()),
            ToolDefinition::new("echo")
                .with_description("Echo text back")
                .with_parameter(ToolParameter::new("text", "string").required()),
        ]
    }
}

#[async_trait]
impl ToolConnection for CalcConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ConnectionError> {
        Ok(Self::tools())
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolInvocationResult, ConnectionError> {
        self.calls.lock().push((name.to_string(), arguments.clone()));
        match name {
            "add" => {
                let a = arguments.get("a").and_then(Value::as_i64).unwrap_or_default();
                let b = arguments.get("b").and_then(Value::as_i64).unwrap_or_default();
                Ok(ToolInvocationResult::success(ToolContent::Primitive(json!(
                    a + b
                ))))
            }
            "echo" => {
                let text = arguments
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(ToolInvocationResult::success(ToolContent::Text(
                    text.to_string(),
                )))
            }
            other => Err(ConnectionError::Protocol(format!("unknown tool {other}"))),
        }
    }

    async fn close(&self) {}
}

/// Everything a turn needs, wired around a scripted backend.
pub struct Harness {
    pub engine: ConversationEngine,
    pub driver: Arc<ScriptedDriver>,
    pub registry: Arc<ToolRegistry>,
    pub calc: Arc<CalcConnection>,
}

impl Harness {
    /// Engine with a connected `calc` server.
    pub fn with_calc(driver: ScriptedDriver) -> Self {
        let registry = Arc::new(ToolRegistry::new(["calc"]));
        let calc = Arc::new(CalcConnection::default());
        registry.publish("calc", calc.clone(), CalcConnection::tools());
        Self::build(driver, registry, calc)
    }

    /// Engine with no tool servers at all.
    pub fn without_tools(driver: ScriptedDriver) -> Self {
        Self::build(
            driver,
            Arc::new(ToolRegistry::default()),
            Arc::new(CalcConnection::default()),
        )
    }

    fn build(
        driver: ScriptedDriver,
        registry: Arc<ToolRegistry>,
        calc: Arc<CalcConnection>,
    ) -> Self {
        let driver = Arc::new(driver);
        let engine = ConversationEngine::new(
            driver.clone(),
            Arc::clone(&registry),
            ToolRouter::new(Arc::clone(&registry)),
            ConversationStore::new(SYSTEM_MESSAGE),
        );
        Self {
            engine,
            driver,
            registry,
            calc,
        }
    }
}

/// Connector handing out [`CalcConnection`]s.
#[derive(Debug, Default)]
pub struct CalcConnector;

#[async_trait]
impl ToolConnector for CalcConnector {
    async fn connect(
        &self,
        _endpoint: &ServerEndpoint,
    ) -> Result<Arc<dyn ToolConnection>, ConnectionError> {
        Ok(Arc::new(CalcConnection::default()))
    }
}
