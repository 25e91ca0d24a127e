//! MCP transport layer.
//!
//! Defines the `McpSession` trait for exchanging JSON-RPC messages with a
//! server, with two HTTP implementations:
//!
//! - [`StreamableHttpSession`]: every message is a POST to one endpoint; the
//!   server answers with plain JSON or a short SSE stream.
//! - [`SseSession`]: the legacy HTTP+SSE transport. A long-lived GET stream
//!   announces a POST endpoint, and responses come back on that stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use hassai_core::sse::{SseDecoder, SseFrame};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::error::McpError;
use crate::types::*;

const SESSION_HEADER: &str = "mcp-session-id";

/// One open conversation with an MCP server.
#[async_trait]
pub trait McpSession: Send {
    /// Send a request and wait for its result.
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification (no response expected).
    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Release server-side resources. Failures are logged, not returned.
    async fn close(self: Box<Self>);
}

/// Perform the MCP initialization handshake on a fresh session.
pub async fn initialize(session: &mut dyn McpSession) -> Result<InitializeResult, McpError> {
    let params = serde_json::to_value(InitializeParams::default())?;
    let result = session.request("initialize", Some(params)).await?;
    let info: InitializeResult = serde_json::from_value(result)?;

    session.notify("notifications/initialized", None).await?;

    tracing::debug!(
        server = info.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
        protocol = info.protocol_version.as_deref().unwrap_or("unknown"),
        "MCP session initialized"
    );
    Ok(info)
}

/// Turn a matched response into its result value.
fn into_result(message: JsonRpcMessage) -> Result<Value, McpError> {
    if let Some(err) = message.error {
        return Err(McpError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    message
        .result
        .ok_or_else(|| McpError::Protocol("response has neither result nor error".into()))
}

/// Parse an SSE frame as a JSON-RPC message, ignoring anything that is not one.
fn frame_message(frame: &SseFrame) -> Option<JsonRpcMessage> {
    if frame.event_name() != "message" {
        return None;
    }
    match serde_json::from_str(&frame.data) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(data = %frame.data, error = %e, "Ignoring unparseable MCP event");
            None
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, McpError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "MCP server error status");
        Err(McpError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// A buffered reader of SSE frames over an HTTP body.
struct FrameReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    ended: bool,
}

impl FrameReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    async fn next_frame(&mut self) -> Result<Option<SseFrame>, McpError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.ended {
                return Ok(None);
            }
            match self.body.next().await {
                Some(chunk) => {
                    let bytes = chunk?;
                    self.pending.extend(self.decoder.push(&bytes));
                }
                None => {
                    self.ended = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }

    /// Read until the response to `id` arrives.
    async fn response_to(&mut self, id: &RpcId) -> Result<JsonRpcMessage, McpError> {
        while let Some(frame) = self.next_frame().await? {
            if let Some(message) = frame_message(&frame) {
                if message.answers(id) {
                    return Ok(message);
                }
                tracing::trace!(method = ?message.method, "Skipping unrelated MCP message");
            }
        }
        Err(McpError::Protocol(format!(
            "event stream closed before response to request {id:?}"
        )))
    }
}

// ── Streamable HTTP ─────────────────────────────────────────────────

/// MCP Streamable HTTP session.
pub struct StreamableHttpSession {
    client: reqwest::Client,
    url: Url,
    token: String,
    session_id: Option<String>,
    next_id: i64,
}

impl StreamableHttpSession {
    pub fn new(client: reqwest::Client, url: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            url,
            token: token.into(),
            session_id: None,
            next_id: 1,
        }
    }

    async fn post(&mut self, body: &impl serde::Serialize) -> Result<reqwest::Response, McpError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = &self.session_id {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = ensure_success(builder.send().await?).await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }
        Ok(response)
    }
}

#[async_trait]
impl McpSession for StreamableHttpSession {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let request = JsonRpcRequest::new(self.next_id, method, params);
        self.next_id += 1;
        tracing::debug!(method = %method, id = ?request.id, "Sending MCP request");

        let response = self.post(&request).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let message = if is_stream {
            FrameReader::new(response).response_to(&request.id).await?
        } else {
            let message: JsonRpcMessage = serde_json::from_slice(&response.bytes().await?)?;
            if !message.answers(&request.id) {
                return Err(McpError::Protocol(format!(
                    "response id {:?} does not match request {:?}",
                    message.id, request.id
                )));
            }
            message
        };

        into_result(message)
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        self.post(&notification).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let Some(session_id) = &self.session_id else {
            return;
        };
        let result = self
            .client
            .delete(self.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Failed to close MCP session");
        }
    }
}

// ── Legacy HTTP+SSE ─────────────────────────────────────────────────

/// MCP HTTP+SSE session.
pub struct SseSession {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
    events: FrameReader,
    next_id: i64,
}

impl SseSession {
    /// Open the event stream and wait for the server to announce its POST endpoint.
    pub async fn connect(
        client: reqwest::Client,
        url: Url,
        token: impl Into<String>,
    ) -> Result<Self, McpError> {
        let token = token.into();
        let response = client
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let mut events = FrameReader::new(ensure_success(response).await?);

        let endpoint = loop {
            match events.next_frame().await? {
                Some(frame) if frame.event_name() == "endpoint" => {
                    break url.join(frame.data.trim())?;
                }
                Some(_) => continue,
                None => {
                    return Err(McpError::Protocol(
                        "event stream closed before endpoint was announced".into(),
                    ));
                }
            }
        };

        if endpoint.origin() != url.origin() {
            return Err(McpError::Protocol(format!(
                "endpoint {endpoint} is not on the server's origin"
            )));
        }

        tracing::debug!(endpoint = %endpoint, "MCP SSE endpoint announced");
        Ok(Self {
            client,
            endpoint,
            token,
            events,
            next_id: 1,
        })
    }

    async fn post(&mut self, body: &impl serde::Serialize) -> Result<(), McpError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl McpSession for SseSession {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let request = JsonRpcRequest::new(self.next_id, method, params);
        self.next_id += 1;
        tracing::debug!(method = %method, id = ?request.id, "Sending MCP request");

        self.post(&request).await?;
        let message = self.events.response_to(&request.id).await?;
        into_result(message)
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn close(self: Box<Self>) {
        // Dropping the event stream ends the session
    }
}
