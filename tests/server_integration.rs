mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use common::{CalcConnector, ScriptedDriver, Step};
use mcp_chat_relay::AppState;
use mcp_chat_relay::conversation::{ConversationEngine, ConversationStore, TurnMode};
use mcp_chat_relay::llm::ToolCall;
use mcp_chat_relay::mcp::{McpHub, ServerEndpoint, ServerState, StatusSummary};
use mcp_chat_relay::server::router;

fn app(hub: Arc<McpHub>, driver: ScriptedDriver) -> TestServer {
    let engine = ConversationEngine::new(
        Arc::new(driver),
        Arc::clone(hub.registry()),
        hub.router(),
        ConversationStore::new(common::SYSTEM_MESSAGE),
    );
    let state = AppState {
        engine,
        hub,
        default_mode: TurnMode::NonStreaming,
    };
    TestServer::new(router(state)).unwrap()
}

async fn calc_hub() -> Arc<McpHub> {
    let hub = Arc::new(McpHub::start(
        vec![ServerEndpoint::new("calc", "http://calc.local/mcp")],
        Arc::new(CalcConnector),
    ));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !hub.registry().has_connections() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    hub
}

#[tokio::test]
async fn test_health() {
    let hub = Arc::new(McpHub::start(Vec::new(), Arc::new(CalcConnector)));
    let server = app(hub, ScriptedDriver::default());

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_status_without_servers() {
    let hub = Arc::new(McpHub::start(Vec::new(), Arc::new(CalcConnector)));
    assert_eq!(hub.status().summary, StatusSummary::NoServersConfigured);

    let server = app(hub, ScriptedDriver::default());
    let body: Value = server.get("/api/mcp/status").await.json();
    assert_eq!(body["summary"], "no_servers_configured");
    assert_eq!(body["servers"], json!([]));
}

#[tokio::test]
async fn test_status_lists_connected_tools() {
    let hub = calc_hub().await;
    let status = hub.status();
    assert_eq!(status.summary, StatusSummary::Ok);
    assert_eq!(status.servers[0].state, ServerState::Ready);

    let server = app(Arc::clone(&hub), ScriptedDriver::default());
    let body: Value = server.get("/api/mcp/status").await.json();
    assert_eq!(body["servers"][0]["name"], "calc");
    assert_eq!(body["servers"][0]["total_tools"], 2);
    assert_eq!(body["servers"][0]["tools"][0]["name"], "add");

    let report = hub.shutdown().await;
    assert!(report.is_clean());
    assert!(!hub.registry().has_connections());
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let hub = Arc::new(McpHub::start(Vec::new(), Arc::new(CalcConnector)));
    let server = app(hub, ScriptedDriver::default());

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_runs_tools_and_returns_events() {
    let hub = calc_hub().await;
    let server = app(
        Arc::clone(&hub),
        ScriptedDriver::new(vec![
            Step::calls(vec![ToolCall::function("call_1", "add", r#"{"a":40,"b":2}"#)]),
            Step::text("The answer is 42"),
        ]),
    );

    let body: Value = server
        .post("/api/chat")
        .json(&json!({ "conversation_id": "conv-1", "message": "What is 40 + 2?" }))
        .await
        .json();

    assert_eq!(body["conversation_id"], "conv-1");
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "tool_result");
    assert_eq!(events[0]["data"]["content"], "42");
    assert_eq!(events[1]["data"]["text"], "The answer is 42");
    assert_eq!(events[2]["type"], "done");

    hub.shutdown().await;
}

#[tokio::test]
async fn test_chat_generates_conversation_id() {
    let hub = Arc::new(McpHub::start(Vec::new(), Arc::new(CalcConnector)));
    let server = app(hub, ScriptedDriver::new(vec![Step::text("hello")]));

    let body: Value = server
        .post("/api/chat")
        .json(&json!({ "message": "hi" }))
        .await
        .json();
    let id = body["conversation_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_chat_stream_is_sse() {
    let hub = Arc::new(McpHub::start(Vec::new(), Arc::new(CalcConnector)));
    let server = app(hub, ScriptedDriver::new(vec![Step::text("hello")]));

    let response = server
        .post("/api/chat/stream")
        .json(&json!({ "conversation_id": "s1", "message": "hi" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "text/event-stream");
    assert_eq!(response.header("x-conversation-id"), "s1");

    let text = response.text();
    assert!(text.starts_with("event: text\ndata: "));
    assert!(text.contains(r#""text":"hello""#));
    assert!(text.ends_with("event: done\ndata: {\"type\":\"done\"}\n\n"));
}
