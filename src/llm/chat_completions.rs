//! OpenAI Chat Completions API driver.
//!
//! Implements [`LlmDriver`] for any OpenAI-compatible server exposing
//! `POST {base_url}/chat/completions`, with and without SSE streaming.

use anyhow::Context;
use futures::StreamExt;
use serde_json::{Value, json};

use super::{
    ChatDelta, DeltaStream, LlmDriver, LlmRequest, LlmResponse, LlmSettings, ToolCall,
    ToolCallFragment,
};

/// Driver for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn body(&self, req: LlmRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": req.messages,
            "stream": stream,
        });

        if let Some(t) = self.settings.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = self.settings.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if let Some(p) = self.settings.top_p {
            body["top_p"] = json!(p);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools);
            body["tool_choice"] = json!("auto");
        }
        if let Some(user) = req.user {
            body["user"] = json!(user);
        }

        body
    }

    async fn send(&self, body: &Value) -> anyhow::Result<reqwest::Response> {
        let mut rb = self.http.post(self.url()).json(body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .send()
            .await
            .context("chat completions request failed")?
            .error_for_status()
            .context("chat completions request rejected")?;
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse> {
        let body = self.body(req, false);
        let v: Value = self
            .send(&body)
            .await?
            .json()
            .await
            .context("chat completions reply is not JSON")?;

        Ok(parse_completion(&v))
    }

    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream> {
        let body = self.body(req, true);
        let byte_stream = self.send(&body).await?.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();

            futures::pin_mut!(byte_stream);
            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let line = line.trim();
                        if !line.starts_with("data:") {
                            continue;
                        }
                        let data = line.trim_start_matches("data:").trim();

                        if data == "[DONE]" {
                            break 'read;
                        }

                        let v: Value = serde_json::from_str(data)
                            .context("malformed chat completions chunk")?;
                        for delta in parse_chunk(&v) {
                            yield delta;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Text and complete tool calls of a non-streaming reply.
fn parse_completion(v: &Value) -> LlmResponse {
    let message = &v["choices"][0]["message"];

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter(|tc| tc.get("type").and_then(Value::as_str).is_none_or(|t| t == "function"))
                .filter_map(|tc| {
                    let id = tc.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;
                    let function = tc.get("function")?;
                    let name = function
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())?;
                    let arguments = function
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Some(ToolCall::function(id, name, arguments))
                })
                .collect()
        })
        .unwrap_or_default();

    LlmResponse {
        content,
        tool_calls,
    }
}

/// Deltas carried by one streamed chunk, in order.
fn parse_chunk(v: &Value) -> Vec<ChatDelta> {
    let delta = &v["choices"][0]["delta"];
    let mut out = Vec::new();

    if let Some(s) = delta.get("content").and_then(Value::as_str) {
        if !s.is_empty() {
            out.push(ChatDelta::Content(s.to_string()));
        }
    }

    if let Some(arr) = delta.get("tool_calls").and_then(Value::as_array) {
        for tc in arr {
            let function = tc.get("function");
            let field = |key: &str| {
                function
                    .and_then(|f| f.get(key))
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            };
            out.push(ChatDelta::ToolCall(ToolCallFragment {
                index: tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize,
                id: tc.get("id").and_then(Value::as_str).map(ToString::to_string),
                name: field("name"),
                arguments: field("arguments"),
            }));
        }
    }

    out
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
