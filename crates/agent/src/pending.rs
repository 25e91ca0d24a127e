//! Accumulation of streamed tool-call fragments.
//!
//! The model spreads each tool call over many chunks. Fragments are merged
//! into [`PendingToolCall`]s keyed by call id, in the order the ids were
//! first seen.

use std::collections::HashMap;

use hassai_core::message::MessageToolCall;
use hassai_core::provider::ToolCallFragment;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A tool call being assembled from stream fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    fn new(id: String, kind: Option<&str>) -> Self {
        Self {
            id,
            kind: kind
                .filter(|k| !k.is_empty())
                .unwrap_or("function")
                .to_string(),
            name: String::new(),
            arguments: String::new(),
        }
    }

    /// Named, with argument text that already parses as JSON.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && serde_json::from_str::<Value>(&self.arguments).is_ok()
    }

    /// Arguments as the object sent to the tool service.
    ///
    /// Empty text or `null` give `{}`; anything that is not a JSON object is
    /// passed along verbatim as `{"raw": <text>}`.
    pub fn parsed_arguments(&self) -> Map<String, Value> {
        let text = self.arguments.trim();
        if text.is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            _ => {
                let mut raw = Map::new();
                raw.insert("raw".into(), Value::String(self.arguments.clone()));
                raw
            }
        }
    }

    /// The record stored on the assistant message that requested this call.
    /// Empty argument text is recorded as `{}`.
    pub fn to_message_call(&self) -> MessageToolCall {
        let arguments = if self.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.arguments.clone()
        };
        MessageToolCall {
            id: self.id.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            arguments,
        }
    }
}

/// Insertion-ordered set of calls for one completion round.
#[derive(Debug, Default)]
pub struct PendingToolCalls {
    calls: IndexMap<String, PendingToolCall>,
    by_index: HashMap<u32, String>,
    last_id: Option<String>,
}

impl PendingToolCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment.
    ///
    /// A fragment without an id belongs to the call last seen at its index,
    /// else to the most recent call, else it starts a new call.
    pub fn merge(&mut self, fragment: &ToolCallFragment) {
        let id = match fragment.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => fragment
                .index
                .and_then(|index| self.by_index.get(&index).cloned())
                .or_else(|| self.last_id.clone())
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
        };

        let call = self
            .calls
            .entry(id.clone())
            .or_insert_with(|| PendingToolCall::new(id.clone(), fragment.kind.as_deref()));

        if let Some(name) = fragment.name.as_deref().filter(|n| !n.is_empty()) {
            call.name = name.to_string();
        }
        if let Some(arguments) = &fragment.arguments {
            call.arguments.push_str(arguments);
        }

        if let Some(index) = fragment.index {
            self.by_index.insert(index, id.clone());
        }
        self.last_id = Some(id);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// True once at least one call is ready to dispatch.
    pub fn has_complete(&self) -> bool {
        self.calls.values().any(PendingToolCall::is_complete)
    }

    /// Finalize: hand out the calls in first-seen order.
    pub fn into_calls(self) -> Vec<PendingToolCall> {
        self.calls.into_values().collect()
    }
}
