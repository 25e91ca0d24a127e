//! Scripted collaborators for orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use hassai_core::error::{ProviderError, ToolError};
use hassai_core::provider::{
    ChunkChoice, ChunkReceiver, FinishReason, Provider, ProviderRequest, StreamChunk,
    ToolCallFragment,
};
use hassai_core::tool::{ToolDescriptor, ToolGateway, ToolPayload};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// One scripted completion: either the chunks to stream or an open failure.
pub type Script = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

/// A provider that plays back one script per `stream` call and records
/// every request it receives.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("no more scripted responses".into())));

        let items = script?;
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item, so this never waits.
            let _ = tx.try_send(item);
        }
        Ok(rx)
    }
}

/// A tool gateway with a fixed catalogue and per-tool results.
pub struct ScriptedGateway {
    catalogue: Result<Vec<ToolDescriptor>, ToolError>,
    results: HashMap<String, Result<ToolPayload, ToolError>>,
    panics: bool,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    lists: Mutex<usize>,
}

impl ScriptedGateway {
    pub fn new(catalogue: Result<Vec<ToolDescriptor>, ToolError>) -> Self {
        Self {
            catalogue,
            results: HashMap::new(),
            panics: false,
            calls: Mutex::new(Vec::new()),
            lists: Mutex::new(0),
        }
    }

    pub fn with_result(mut self, name: &str, result: Result<ToolPayload, ToolError>) -> Self {
        self.results.insert(name.to_string(), result);
        self
    }

    /// Every `call_tool` panics.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_count(&self) -> usize {
        *self.lists.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ToolGateway for ScriptedGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        *self.lists.lock().unwrap() += 1;
        self.catalogue.clone()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolPayload, ToolError> {
        if self.panics {
            panic!("scripted gateway panic in {name}");
        }
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        self.results.get(name).cloned().unwrap_or_else(|| {
            Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("no scripted result for {name}"),
            })
        })
    }
}

pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk::single(ChunkChoice::text(text))
}

pub fn finish_chunk(reason: FinishReason) -> StreamChunk {
    StreamChunk::single(ChunkChoice::finished(reason))
}

pub fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> StreamChunk {
    StreamChunk::single(ChunkChoice {
        tool_calls: vec![ToolCallFragment {
            index: Some(index),
            id: id.map(String::from),
            kind: id.map(|_| "function".to_string()),
            name: name.map(String::from),
            arguments: Some(arguments.to_string()),
        }],
        ..Default::default()
    })
}

/// Build a payload from a JSON object literal.
pub fn payload(value: Value) -> ToolPayload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".into(), other);
            map
        }
    }
}
