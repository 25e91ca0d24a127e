//! Error types for the MCP crate.

use std::time::Duration;

use hassai_core::ToolError;

/// Errors that can occur while talking to an MCP server.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The HTTP request itself failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The server returned a JSON-RPC error object.
    #[error("{message}")]
    Rpc { code: i64, message: String },

    /// The server broke the protocol (missing result, closed stream, bad endpoint).
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        McpError::Transport(e.to_string())
    }
}

impl From<McpError> for ToolError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Transport(_) | McpError::Status { .. } | McpError::InvalidUrl(_) => {
                ToolError::Unavailable(e.to_string())
            }
            McpError::Timeout(d) => ToolError::Timeout {
                timeout_secs: d.as_secs(),
            },
            McpError::JsonParse(_) | McpError::Rpc { .. } | McpError::Protocol(_) => {
                ToolError::Protocol(e.to_string())
            }
        }
    }
}
