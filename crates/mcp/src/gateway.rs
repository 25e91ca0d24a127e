//! The Home Assistant tool gateway.
//!
//! Implements [`ToolGateway`] over MCP. Every operation opens its own
//! session, performs the handshake, does its one job and closes the session
//! again. Operations are serialized through an async mutex.

use std::time::Duration;

use async_trait::async_trait;
use hassai_config::{HomeAssistantConfig, McpTransportKind};
use hassai_core::error::ToolError;
use hassai_core::tool::{ToolDescriptor, ToolGateway, ToolPayload, empty_object_schema};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use url::Url;

use crate::error::McpError;
use crate::transport::{McpSession, SseSession, StreamableHttpSession, initialize};
use crate::types::*;

/// Upper bound on `tools/list` pages followed in one listing.
const MAX_PAGES: usize = 64;

/// Concrete transport after resolving `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sse,
    StreamableHttp,
}

impl Transport {
    /// Resolve the configured kind against the server URL.
    pub fn resolve(kind: McpTransportKind, url: &Url) -> Self {
        match kind {
            McpTransportKind::Sse => Self::Sse,
            McpTransportKind::StreamableHttp => Self::StreamableHttp,
            McpTransportKind::Auto => {
                if url.path().trim_end_matches('/').ends_with("/sse") {
                    Self::Sse
                } else {
                    Self::StreamableHttp
                }
            }
        }
    }
}

/// MCP-backed [`ToolGateway`].
pub struct McpToolGateway {
    client: reqwest::Client,
    url: Url,
    token: String,
    transport: Transport,
    timeout: Duration,
    lock: Mutex<()>,
}

impl McpToolGateway {
    pub fn new(
        url: &str,
        token: impl Into<String>,
        kind: McpTransportKind,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let url = Url::parse(url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            transport: Transport::resolve(kind, &url),
            client,
            url,
            token: token.into(),
            timeout,
            lock: Mutex::new(()),
        })
    }

    /// Build a gateway from the `[home_assistant]` settings.
    pub fn from_config(config: &HomeAssistantConfig) -> Result<Self, ToolError> {
        let url = config
            .mcp_url
            .as_deref()
            .ok_or_else(|| ToolError::Unavailable("HOME_ASSISTANT_MCP_URL is not set".into()))?;
        let token = config
            .mcp_token
            .clone()
            .ok_or_else(|| ToolError::Unavailable("HOME_ASSISTANT_MCP_TOKEN is not set".into()))?;

        Self::new(url, token, config.transport, config.timeout()).map_err(ToolError::from)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    async fn open(&self) -> Result<Box<dyn McpSession>, McpError> {
        let mut session: Box<dyn McpSession> = match self.transport {
            Transport::StreamableHttp => Box::new(StreamableHttpSession::new(
                self.client.clone(),
                self.url.clone(),
                self.token.clone(),
            )),
            Transport::Sse => Box::new(
                SseSession::connect(self.client.clone(), self.url.clone(), self.token.clone())
                    .await?,
            ),
        };

        if let Err(e) = initialize(session.as_mut()).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn fetch_catalogue(&self) -> Result<Vec<RemoteTool>, McpError> {
        let mut session = self.open().await?;
        let result = list_all(session.as_mut()).await;
        session.close().await;
        result
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult, McpError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        let mut session = self.open().await?;
        let result = session.request("tools/call", Some(params)).await;
        session.close().await;

        Ok(serde_json::from_value(result?)?)
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, McpError>>,
    ) -> Result<T, McpError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| McpError::Timeout(self.timeout))?
    }
}

async fn list_all(session: &mut dyn McpSession) -> Result<Vec<RemoteTool>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let params = match cursor.take() {
            Some(cursor) => Some(serde_json::to_value(ListToolsParams {
                cursor: Some(cursor),
            })?),
            None => None,
        };
        let page: ListToolsResult =
            serde_json::from_value(session.request("tools/list", params).await?)?;
        tools.extend(page.tools);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }

    tracing::warn!(pages = MAX_PAGES, "Tool listing truncated");
    Ok(tools)
}

/// Convert a server tool into the descriptor shape offered to the model.
pub fn to_descriptor(tool: RemoteTool) -> ToolDescriptor {
    let parameters = match tool.input_schema {
        Some(Value::Object(schema)) if !schema.is_empty() => Value::Object(schema),
        _ => empty_object_schema(),
    };
    ToolDescriptor {
        name: tool.name,
        description: tool.description.unwrap_or_default(),
        parameters,
    }
}

/// Normalize a `tools/call` result into a payload, or the failure it reports.
pub fn normalize_result(name: &str, result: CallToolResult) -> Result<ToolPayload, ToolError> {
    let payload = match result.structured_content {
        Some(Value::Object(map)) if !map.is_empty() => map,
        _ => {
            let text = result
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Unsupported => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            let mut map = Map::new();
            map.insert("text".into(), Value::String(text.trim().to_string()));
            map
        }
    };

    if result.is_error {
        let reason = payload
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Tool {name} returned an error"));
        return Err(ToolError::ExecutionFailed {
            tool_name: name.to_string(),
            reason,
        });
    }

    Ok(payload)
}

#[async_trait]
impl ToolGateway for McpToolGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let _guard = self.lock.lock().await;

        let tools = self.bounded(self.fetch_catalogue()).await?;
        tracing::info!(count = tools.len(), "Fetched tool catalogue");
        Ok(tools.into_iter().map(to_descriptor).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolPayload, ToolError> {
        let _guard = self.lock.lock().await;

        tracing::debug!(tool = %name, "Calling tool");
        match self.bounded(self.invoke(name, arguments)).await {
            Ok(result) => normalize_result(name, result),
            Err(McpError::Rpc { message, .. }) => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: message,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_result(texts: &[&str], is_error: bool) -> CallToolResult {
        CallToolResult {
            content: texts
                .iter()
                .map(|t| ContentBlock::Text { text: t.to_string() })
                .collect(),
            structured_content: None,
            is_error,
        }
    }

    async fn mount_handshake(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": {"protocolVersion": "2025-03-26"}
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
    }

    fn gateway(server: &MockServer) -> McpToolGateway {
        McpToolGateway::new(
            &format!("{}/mcp", server.uri()),
            "tok",
            McpTransportKind::Auto,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn auto_transport_resolution() {
        let sse = Url::parse("http://ha.local:8123/mcp_server/sse").unwrap();
        let http = Url::parse("http://ha.local:8123/api/mcp").unwrap();
        assert_eq!(Transport::resolve(McpTransportKind::Auto, &sse), Transport::Sse);
        assert_eq!(
            Transport::resolve(McpTransportKind::Auto, &http),
            Transport::StreamableHttp
        );
        assert_eq!(
            Transport::resolve(McpTransportKind::StreamableHttp, &sse),
            Transport::StreamableHttp
        );
    }

    #[test]
    fn descriptor_defaults() {
        let desc = to_descriptor(RemoteTool {
            name: "HassTurnOn".into(),
            description: None,
            input_schema: Some(serde_json::json!({})),
        });
        assert_eq!(desc.description, "");
        assert_eq!(desc.parameters, empty_object_schema());

        let desc = to_descriptor(RemoteTool {
            name: "HassTurnOn".into(),
            description: Some("Turns on".into()),
            input_schema: Some(serde_json::json!({"type": "object", "properties": {"name": {"type": "string"}}})),
        });
        assert_eq!(desc.parameters["properties"]["name"]["type"], "string");
    }

    #[test]
    fn structured_content_passes_through() {
        let result = CallToolResult {
            content: vec![ContentBlock::Text { text: "ignored".into() }],
            structured_content: Some(serde_json::json!({"success": true})),
            is_error: false,
        };
        let payload = normalize_result("light.turn_on", result).unwrap();
        assert_eq!(payload.get("success"), Some(&Value::Bool(true)));
        assert!(payload.get("text").is_none());
    }

    #[test]
    fn text_blocks_are_joined_and_trimmed() {
        let payload = normalize_result("x", text_result(&[" Turned on", "the light "], false)).unwrap();
        assert_eq!(payload["text"], "Turned on the light");
    }

    #[test]
    fn empty_structured_content_falls_back_to_text() {
        let result = CallToolResult {
            content: vec![ContentBlock::Text { text: "ok".into() }],
            structured_content: Some(serde_json::json!({})),
            is_error: false,
        };
        assert_eq!(normalize_result("x", result).unwrap()["text"], "ok");
    }

    #[test]
    fn error_flag_uses_service_text() {
        let err = normalize_result("light.turn_on", text_result(&["Entity not found"], true)).unwrap_err();
        assert_eq!(err.to_string(), "Entity not found");
    }

    #[test]
    fn error_flag_without_text_gets_default_reason() {
        let err = normalize_result("light.turn_on", text_result(&[], true)).unwrap_err();
        assert_eq!(err.to_string(), "Tool light.turn_on returned an error");
    }

    #[test]
    fn from_config_requires_url_and_token() {
        let err = McpToolGateway::from_config(&HomeAssistantConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("HOME_ASSISTANT_MCP_URL"));
    }

    #[tokio::test]
    async fn list_tools_follows_cursor() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list", "params": {"cursor": "p2"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 3,
                "result": {"tools": [{"name": "HassTurnOff"}], "nextCursor": ""}
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 2,
                "result": {
                    "tools": [{"name": "HassTurnOn", "description": "Turns on"}],
                    "nextCursor": "p2"
                }
            })))
            .mount(&server)
            .await;

        // Both pages share one session: the second request has id 3
        let tools = gateway(&server).list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["HassTurnOn", "HassTurnOff"]);
    }

    #[tokio::test]
    async fn list_tools_single_page() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 2,
                "result": {"tools": [
                    {"name": "HassTurnOn", "description": "Turns on", "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}},
                    {"name": "GetLiveContext"}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tools = gateway(&server).list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "HassTurnOn");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].parameters, empty_object_schema());
    }

    #[tokio::test]
    async fn call_tool_normalizes_text() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({
                "method": "tools/call",
                "params": {"name": "HassTurnOn", "arguments": {"name": "kitchen light"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 2,
                "result": {"content": [{"type": "text", "text": "Turned on"}], "isError": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut args = Map::new();
        args.insert("name".into(), Value::String("kitchen light".into()));
        let payload = gateway(&server).call_tool("HassTurnOn", args).await.unwrap();
        assert_eq!(payload["text"], "Turned on");
    }

    /// Records when each matching request arrives and answers after a delay.
    struct SlowCall {
        arrivals: std::sync::Arc<std::sync::Mutex<Vec<std::time::Instant>>>,
        delay: Duration,
    }

    impl wiremock::Respond for SlowCall {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(std::time::Instant::now());
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "jsonrpc": "2.0", "id": 2,
                    "result": {"content": [{"type": "text", "text": "ok"}], "isError": false}
                }))
                .set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn concurrent_calls_run_one_at_a_time() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        let delay = Duration::from_millis(150);
        let arrivals = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .respond_with(SlowCall {
                arrivals: arrivals.clone(),
                delay,
            })
            .expect(2)
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        let (first, second) = tokio::join!(
            gateway.call_tool("HassTurnOn", Map::new()),
            gateway.call_tool("HassTurnOff", Map::new()),
        );
        assert_eq!(first.unwrap()["text"], "ok");
        assert_eq!(second.unwrap()["text"], "ok");

        let arrivals = arrivals.lock().unwrap();
        assert_eq!(arrivals.len(), 2);
        // The second call only starts once the first answer came back
        assert!(arrivals[1].duration_since(arrivals[0]) >= delay);
    }

    #[tokio::test]
    async fn call_tool_rpc_error_is_execution_failure() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 2,
                "error": {"code": -32602, "message": "Unknown tool: Nope"}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).call_tool("Nope", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert_eq!(err.to_string(), "Unknown tool: Nope");
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let gateway = McpToolGateway::new(
            "http://127.0.0.1:9/mcp",
            "tok",
            McpTransportKind::StreamableHttp,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = gateway.list_tools().await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Unavailable(_) | ToolError::Timeout { .. }
        ));
    }
}
