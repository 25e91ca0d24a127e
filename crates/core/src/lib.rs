//! # hassAI Core
//!
//! Domain types, traits, and error definitions for the hassAI assistant backend.
//! This crate has **no HTTP dependencies**; it defines the domain model that
//! the provider, tool-gateway and orchestration crates implement against.
//!
//! ## Design Philosophy
//!
//! Each remote collaborator of the conversation loop is a trait here:
//! - [`Provider`] streams completions from the LLM service
//! - [`ToolGateway`] lists and invokes tools on the tool service
//!
//! Implementations live in their own crates, so tests can swap in scripted
//! doubles without a network.

pub mod error;
pub mod message;
pub mod provider;
pub mod sse;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    ChunkChoice, ChunkReceiver, FinishReason, Provider, ProviderRequest, StreamChunk,
    ToolCallFragment,
};
pub use sse::{SseDecoder, SseFrame};
pub use tool::{ToolDescriptor, ToolGateway, ToolPayload};
