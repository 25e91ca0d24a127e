//! Provider trait: the abstraction over the streaming completion service.
//!
//! A Provider knows how to send a conversation plus tool descriptors to an
//! LLM and hand back the incremental chunks as they arrive.
//!
//! Implementations: OpenRouter (OpenAI-compatible chat completions).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolDescriptor;

/// One streaming completion request.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    /// The full transcript so far
    pub messages: Vec<Message>,

    /// Tools the model may call; empty means none are offered
    pub tools: Vec<ToolDescriptor>,
}

/// The receiving side of a completion stream.
///
/// Single-pass: once drained (or dropped) the request is over.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// A single decoded chunk from a streaming response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub choices: Vec<ChunkChoice>,
}

/// Per-choice partial output carried by a chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkChoice {
    /// Non-empty text fragments in arrival order
    pub text: Vec<String>,

    /// Tool-call fragments in arrival order
    pub tool_calls: Vec<ToolCallFragment>,

    /// Set on the last chunk of the choice
    pub finish_reason: Option<FinishReason>,
}

impl ChunkChoice {
    /// A choice carrying only a text fragment.
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            text: vec![fragment.into()],
            ..Default::default()
        }
    }

    /// A choice carrying only a finish reason.
    pub fn finished(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }
}

impl StreamChunk {
    /// A chunk with a single choice.
    pub fn single(choice: ChunkChoice) -> Self {
        Self {
            choices: vec![choice],
        }
    }
}

/// A piece of a tool invocation, as streamed by the model.
///
/// Every field is optional because the model spreads one call across many
/// chunks: typically the first carries id and name, later ones carry only
/// argument text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: Option<u32>,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub arguments: Option<String>,
}

/// Why a choice stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "tool_calls" => Self::ToolCalls,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The core Provider trait.
///
/// The conversation loop calls `stream()` without knowing which backend is
/// behind it. A returned receiver yields chunks until the service signals the
/// end; a transport failure mid-body arrives as a final `Err` item.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Open a streaming completion.
    async fn stream(&self, request: ProviderRequest)
    -> std::result::Result<ChunkReceiver, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
