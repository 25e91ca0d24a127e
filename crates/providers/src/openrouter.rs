//! OpenRouter provider implementation.
//!
//! Speaks the OpenAI-compatible `/chat/completions` endpoint in streaming
//! mode and decodes its SSE body into [`StreamChunk`]s.
//!
//! Supports:
//! - Streaming chat completions with tool use / function calling
//! - OpenRouter attribution headers (`HTTP-Referer`, `X-Title`)
//! - Health checks via `/models`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use hassai_config::OpenRouterConfig;
use hassai_core::error::ProviderError;
use hassai_core::message::{Message, Role};
use hassai_core::provider::{
    ChunkChoice, ChunkReceiver, FinishReason, ProviderRequest, StreamChunk, ToolCallFragment,
};
use hassai_core::sse::{SseDecoder, SseFrame};
use hassai_core::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Capacity of the chunk channel between the reader task and the consumer.
const CHUNK_BUFFER: usize = 64;

/// A streaming client for OpenRouter.
pub struct OpenRouterProvider {
    base_url: String,
    api_key: String,
    model: String,
    referer: String,
    title: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Build a provider from the `[openrouter]` settings.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("OPENROUTER_API_KEY is not set".into()))?;

        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let content = if m.role == Role::Assistant
                    && !m.tool_calls.is_empty()
                    && m.content.is_empty()
                {
                    None
                } else {
                    Some(m.content.clone())
                };

                ApiMessage {
                    role: match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::System => "system",
                        Role::Tool => "tool",
                    },
                    content,
                    tool_calls: if m.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            m.tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: tc.kind.clone(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.clone(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: m.tool_call_id.clone(),
                }
            })
            .collect()
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolDescriptor]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "stream": true,
        });

        if !tools.is_empty() {
            body["tools"] = tools.iter().map(ToolDescriptor::to_function_spec).collect();
        }

        body
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl hassai_core::Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request.messages, &request.tools);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let send = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("no response within {:?}", self.timeout))
            })?
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(CHUNK_BUFFER);
        let idle_timeout = self.timeout;

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            loop {
                let next = tokio::select! {
                    // Consumer went away: drop the body, which closes the connection
                    _ = tx.closed() => return,
                    next = tokio::time::timeout(idle_timeout, byte_stream.next()) => next,
                };

                let frames = match next {
                    Ok(Some(Ok(bytes))) => decoder.push(&bytes),
                    Ok(Some(Err(e))) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let _ = tx
                            .send(Err(ProviderError::Timeout(format!(
                                "stream idle for {idle_timeout:?}"
                            ))))
                            .await;
                        return;
                    }
                };

                for frame in frames {
                    match handle_frame(&frame) {
                        FrameOutcome::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        FrameOutcome::Failed(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        FrameOutcome::Done => return,
                        FrameOutcome::Skip => {}
                    }
                }
            }

            // Body ended without [DONE]
            if let Some(frame) = decoder.finish()
                && let FrameOutcome::Chunk(chunk) = handle_frame(&frame)
            {
                let _ = tx.send(Ok(chunk)).await;
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }
}

enum FrameOutcome {
    Chunk(StreamChunk),
    Failed(ProviderError),
    Done,
    Skip,
}

/// Interpret one SSE frame from the completions body.
fn handle_frame(frame: &SseFrame) -> FrameOutcome {
    let data = frame.data.trim();
    if data.is_empty() {
        return FrameOutcome::Skip;
    }
    if data == "[DONE]" {
        return FrameOutcome::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(StreamResponse {
            error: Some(error), ..
        }) => FrameOutcome::Failed(ProviderError::StreamInterrupted(error.message)),
        Ok(resp) if resp.choices.is_empty() => FrameOutcome::Skip,
        Ok(resp) => FrameOutcome::Chunk(resp.into_chunk()),
        Err(e) => {
            debug!(data = %data, error = %e, "Skipping malformed stream chunk");
            FrameOutcome::Skip
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

/// OpenRouter reports failures after the 200 status as an `error` object.
#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<DeltaContent>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// Some models stream content as a list of typed parts instead of a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl DeltaContent {
    fn into_fragments(self) -> Vec<String> {
        match self {
            Self::Text(text) if text.is_empty() => Vec::new(),
            Self::Text(text) => vec![text],
            Self::Parts(parts) => parts
                .into_iter()
                .filter(|p| p.kind.as_deref() == Some("text"))
                .filter_map(|p| p.text)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl StreamResponse {
    fn into_chunk(self) -> StreamChunk {
        StreamChunk {
            choices: self
                .choices
                .into_iter()
                .map(|choice| ChunkChoice {
                    text: choice
                        .delta
                        .content
                        .map(DeltaContent::into_fragments)
                        .unwrap_or_default(),
                    tool_calls: choice
                        .delta
                        .tool_calls
                        .unwrap_or_default()
                        .into_iter()
                        .map(|tc| {
                            let (name, arguments) = match tc.function {
                                Some(f) => (f.name, f.arguments),
                                None => (None, None),
                            };
                            ToolCallFragment {
                                index: tc.index,
                                id: tc.id,
                                kind: tc.kind,
                                name,
                                arguments,
                            }
                        })
                        .collect(),
                    finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hassai_core::Provider;
    use hassai_core::message::MessageToolCall;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> OpenRouterConfig {
        OpenRouterConfig {
            api_key: Some("sk-or-test".into()),
            base_url: base_url.into(),
            timeout_secs: 5.0,
            ..OpenRouterConfig::default()
        }
    }

    fn sse(frames: &[&str]) -> String {
        frames.iter().map(|f| format!("data: {f}\n\n")).collect()
    }

    async fn drain(mut rx: ChunkReceiver) -> Vec<Result<StreamChunk, ProviderError>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    fn parse(data: &str) -> StreamChunk {
        serde_json::from_str::<StreamResponse>(data)
            .unwrap()
            .into_chunk()
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let err = OpenRouterProvider::from_config(&OpenRouterConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn body_omits_tools_when_empty() {
        let provider = OpenRouterProvider::from_config(&config("http://localhost")).unwrap();
        let body = provider.request_body(&[Message::user("hi")], &[]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "google/gemini-2.0-flash-001");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn body_carries_tool_specs() {
        let provider = OpenRouterProvider::from_config(&config("http://localhost")).unwrap();
        let tools = vec![ToolDescriptor {
            name: "light.turn_on".into(),
            description: "Turn on".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = provider.request_body(&[Message::user("hi")], &tools);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "light.turn_on");
    }

    #[test]
    fn tool_call_only_assistant_message_has_no_content() {
        let msg = Message::tool_request(
            "",
            MessageToolCall {
                id: "call_1".into(),
                kind: "function".into(),
                name: "light.turn_on".into(),
                arguments: "{}".into(),
            },
        );
        let api = serde_json::to_value(OpenRouterProvider::to_api_messages(&[msg])).unwrap();
        assert!(api[0].get("content").is_none());
        assert_eq!(api[0]["tool_calls"][0]["type"], "function");
        assert_eq!(api[0]["tool_calls"][0]["function"]["arguments"], "{}");
    }

    #[test]
    fn tool_result_message_conversion() {
        let msg = Message::tool_result("call_1", r#"{"text":"ok"}"#);
        let api = serde_json::to_value(OpenRouterProvider::to_api_messages(&[msg])).unwrap();
        assert_eq!(api[0]["role"], "tool");
        assert_eq!(api[0]["tool_call_id"], "call_1");
        assert_eq!(api[0]["content"], r#"{"text":"ok"}"#);
    }

    #[test]
    fn parse_content_parts() {
        let chunk = parse(
            r#"{"choices":[{"delta":{"content":[{"type":"text","text":"Hel"},{"type":"image_url","text":"x"},{"type":"text","text":""},{"type":"text","text":"lo"}]}}]}"#,
        );
        assert_eq!(chunk.choices[0].text, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn parse_tool_call_delta() {
        let chunk = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","type":"function","function":{"name":"light.turn_on","arguments":""}}]},"finish_reason":null}]}"#,
        );
        let frag = &chunk.choices[0].tool_calls[0];
        assert_eq!(frag.index, Some(0));
        assert_eq!(frag.id.as_deref(), Some("call_abc"));
        assert_eq!(frag.name.as_deref(), Some("light.turn_on"));
        assert_eq!(frag.arguments.as_deref(), Some(""));
    }

    #[test]
    fn parse_finish_and_empty_content() {
        let chunk = parse(r#"{"choices":[{"delta":{"content":""},"finish_reason":"tool_calls"}]}"#);
        assert!(chunk.choices[0].text.is_empty());
        assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn mid_stream_error_object_fails() {
        let frame = SseFrame {
            event: None,
            data: r#"{"error":{"message":"upstream overloaded","code":502}}"#.into(),
        };
        assert!(matches!(
            handle_frame(&frame),
            FrameOutcome::Failed(ProviderError::StreamInterrupted(m)) if m == "upstream overloaded"
        ));
    }

    #[tokio::test]
    async fn streams_text_chunks_with_attribution_headers() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-or-test"))
            .and(header("HTTP-Referer", "https://github.com/"))
            .and(header("X-Title", "hassAI Client"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&config(&server.uri())).unwrap();
        let rx = provider
            .stream(ProviderRequest {
                messages: vec![Message::user("hi")],
                tools: vec![],
            })
            .await
            .unwrap();

        let chunks: Vec<StreamChunk> = drain(rx).await.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        let text: String = chunks
            .iter()
            .flat_map(|c| c.choices.iter().flat_map(|ch| ch.text.clone()))
            .collect();
        assert_eq!(text, "Hello");
        assert_eq!(chunks[2].choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let server = MockServer::start().await;
        let body = format!(
            ": OPENROUTER PROCESSING\n\n{}",
            sse(&[
                "{not json",
                r#"{"choices":[{"delta":{"content":"ok"}}]}"#,
                "[DONE]",
            ])
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&config(&server.uri())).unwrap();
        let rx = provider.stream(ProviderRequest::default()).await.unwrap();
        let items = drain(rx).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().choices[0].text, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn body_without_done_still_ends() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&config(&server.uri())).unwrap();
        let rx = provider.stream(ProviderRequest::default()).await.unwrap();
        let items = drain(rx).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().choices[0].text, vec!["tail".to_string()]);
    }

    #[tokio::test]
    async fn error_status_carries_code_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&config(&server.uri())).unwrap();
        let err = provider
            .stream(ProviderRequest::default())
            .await
            .err()
            .unwrap();
        match err {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_hits_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer sk-or-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&config(&server.uri())).unwrap();
        assert!(provider.health_check().await.unwrap());
    }
}
