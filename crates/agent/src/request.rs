//! Inbound run request.

use hassai_core::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// One message as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl IncomingMessage {
    pub fn to_message(&self) -> Message {
        // Caller messages carry role and content only, never tool-call metadata
        let mut message = Message::with_role(self.role, self.content.clone());
        if let Some(id) = self.id.as_ref().filter(|id| !id.is_empty()) {
            message.id = id.clone();
        }
        message
    }
}

/// A request to run one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Passed through from voice clients; only logged.
    #[serde(default = "default_voice")]
    pub voice: bool,

    pub messages: Vec<IncomingMessage>,
}

fn default_voice() -> bool {
    true
}

impl ChatRequest {
    /// A request holding a single user message.
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            voice: false,
            messages: vec![IncomingMessage {
                id: None,
                role: Role::User,
                content: text.into(),
            }],
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.iter().map(IncomingMessage::to_message).collect()
    }
}
