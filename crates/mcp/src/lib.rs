//! MCP (Model Context Protocol) client for hassAI.
//!
//! Connects to the Home Assistant MCP server and exposes its tools through
//! the `hassai_core::ToolGateway` trait.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Streamable HTTP and legacy HTTP+SSE sessions
//! - **gateway**: `McpToolGateway`, one short-lived session per operation
//! - **error**: `McpError`, converted to `ToolError` at the gateway boundary

pub mod error;
pub mod gateway;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use gateway::{McpToolGateway, Transport};
pub use transport::{McpSession, SseSession, StreamableHttpSession};
