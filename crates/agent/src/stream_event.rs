//! Outward streaming events.
//!
//! `ChatEvent` is what a caller of the conversation loop sees: one JSON
//! object per SSE frame, never revised once sent.

use hassai_core::message::ConversationId;
use serde::{Deserialize, Serialize};

/// The kinds of event in a run.
///
/// - `conversation`: the run started; carries `status = "connected"`
/// - `token`: partial text from the model, verbatim
/// - `status`: tool progress (`Calling …`, `Tool … completed`)
/// - `complete`: the final answer; the stream ends
/// - `error`: the run failed; the stream ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEventKind {
    Conversation,
    Token,
    Status,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: ChatEventKind,
    pub content: Option<String>,
    pub conversation_id: Option<String>,
    pub status: Option<String>,
}

impl ChatEvent {
    fn new(kind: ChatEventKind, id: &ConversationId, content: Option<String>) -> Self {
        Self {
            kind,
            content,
            conversation_id: Some(id.to_string()),
            status: None,
        }
    }

    pub fn connected(id: &ConversationId) -> Self {
        Self {
            status: Some("connected".into()),
            ..Self::new(ChatEventKind::Conversation, id, None)
        }
    }

    pub fn token(id: &ConversationId, text: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Token, id, Some(text.into()))
    }

    pub fn status(id: &ConversationId, text: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Status, id, Some(text.into()))
    }

    /// Final answer; empty text is sent as `null`.
    pub fn complete(id: &ConversationId, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(
            ChatEventKind::Complete,
            id,
            (!text.is_empty()).then_some(text),
        )
    }

    pub fn error(id: &ConversationId, message: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Error, id, Some(message.into()))
    }

    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            ChatEventKind::Conversation => "conversation",
            ChatEventKind::Token => "token",
            ChatEventKind::Status => "status",
            ChatEventKind::Complete => "complete",
            ChatEventKind::Error => "error",
        }
    }

    /// True for the events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ChatEventKind::Complete | ChatEventKind::Error)
    }
}
