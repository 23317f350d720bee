//! MCP client sessions backed by `rmcp` over streamable HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    RoleClient,
    model::CallToolRequestParam,
    service::{Peer, ServiceError, ServiceExt},
    transport::StreamableHttpClientTransport,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::mcp::connection::{ConnectionError, ToolConnection, ToolConnector};
use crate::mcp::types::{ServerEndpoint, ToolContent, ToolDefinition, ToolInvocationResult};

type DynClientService = rmcp::service::RunningService<
    RoleClient,
    Box<dyn rmcp::service::DynService<RoleClient>>,
>;

/// Opens `rmcp` client sessions to remote MCP servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

#[async_trait]
impl ToolConnector for RmcpConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Arc<dyn ToolConnection>, ConnectionError> {
        let transport = StreamableHttpClientTransport::from_uri(endpoint.url.clone());
        let service = ().into_dyn().serve(transport).await.map_err(|e| {
            ConnectionError::Connect(format!(
                "failed to connect MCP server '{}': {e}",
                endpoint.name
            ))
        })?;

        tracing::debug!(server = %endpoint.name, url = %endpoint.url, "MCP session opened");

        let peer = service.peer().clone();
        Ok(Arc::new(RmcpConnection {
            server: endpoint.name.clone(),
            peer,
            service: Mutex::new(Some(service)),
        }))
    }
}

/// One open `rmcp` session.
struct RmcpConnection {
    server: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<DynClientService>>,
}

impl std::fmt::Debug for RmcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmcpConnection")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolConnection for RmcpConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ConnectionError> {
        let tools = self.peer.list_all_tools().await.map_err(classify)?;

        Ok(tools
            .into_iter()
            .map(|t| {
                ToolDefinition::from_input_schema(
                    t.name.to_string(),
                    t.description.map(|d| d.to_string()),
                    &t.input_schema,
                )
            })
            .collect())
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<ToolInvocationResult, ConnectionError> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await
            .map_err(classify)?;

        let raw = serde_json::to_value(&result)
            .map_err(|e| ConnectionError::Protocol(format!("unreadable tool result: {e}")))?;
        Ok(invocation_from_call_result(raw))
    }

    async fn close(&self) {
        let Some(service) = self.service.lock().await.take() else {
            return;
        };
        if let Err(e) = service.cancel().await {
            tracing::warn!(server = %self.server, error = %e, "MCP session did not close cleanly");
        }
    }
}

fn classify(err: ServiceError) -> ConnectionError {
    match err {
        ServiceError::McpError(data) => ConnectionError::Protocol(data.message.to_string()),
        ServiceError::UnexpectedResponse => {
            ConnectionError::Protocol("unexpected response".to_string())
        }
        ServiceError::Timeout { .. } => ConnectionError::Timeout,
        other => ConnectionError::Connect(other.to_string()),
    }
}

/// Map a serialized MCP `CallToolResult` onto [`ToolInvocationResult`].
///
/// A single content item is used as-is, several are kept as an array, and
/// `structuredContent` fills in when the content list is empty.
fn invocation_from_call_result(raw: Value) -> ToolInvocationResult {
    let is_error = raw.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let error_code = is_error.then_some(1);

    let mut items = match raw.get("content") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return ToolInvocationResult {
                content: ToolContent::Unknown(raw.to_string()),
                error_code,
            };
        }
    };

    let content = match items.len() {
        0 => raw.get("structuredContent").cloned().unwrap_or(Value::Null),
        1 => items.remove(0),
        _ => Value::Array(items),
    };

    ToolInvocationResult {
        content: ToolContent::from_value(content),
        error_code,
    }
}
