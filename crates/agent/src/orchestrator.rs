//! The conversation loop.
//!
//! One run goes through an explicit state machine:
//!
//! ```text
//! AwaitingTools ──▶ Streaming ──▶ DispatchingTools ──▶ Streaming ──▶ … ──▶ Done
//!                       │                 │
//!                       └──────▶ Failed ◀─┘          (any state) ──▶ Cancelled
//! ```
//!
//! Tool dispatch never overlaps streaming. Every event goes into a bounded
//! channel; when the receiving side goes away the run stops at the next send
//! or before its next network operation.

use std::sync::Arc;

use hassai_config::AppConfig;
use hassai_core::message::{Conversation, ConversationId, Message};
use hassai_core::provider::{FinishReason, Provider, ProviderRequest};
use hassai_core::tool::{ToolDescriptor, ToolGateway, ToolPayload};
use hassai_mcp::McpToolGateway;
use hassai_providers::OpenRouterProvider;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::pending::{PendingToolCall, PendingToolCalls};
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::request::ChatRequest;
use crate::stream_event::ChatEvent;

const EVENT_BUFFER: usize = 128;
const DEFAULT_MAX_ROUNDS: u32 = 25;

/// Drives conversations between the completion service and the tool service.
///
/// Cheap to clone; the collaborators are shared.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolGateway>,
    system_prompt: String,
    max_rounds: u32,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<dyn ToolGateway>) -> Self {
        Self {
            provider,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Build the OpenRouter client and the MCP gateway from configuration.
    pub fn from_config(config: &AppConfig) -> hassai_core::Result<Self> {
        let provider = OpenRouterProvider::from_config(&config.openrouter)?;
        let tools = McpToolGateway::from_config(&config.home_assistant)?;

        let mut orchestrator = Self::new(Arc::new(provider), Arc::new(tools))
            .with_max_rounds(config.assistant.max_rounds);
        if let Some(prompt) = config
            .assistant
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            orchestrator = orchestrator.with_system_prompt(prompt);
        }
        Ok(orchestrator)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Start a run and return the receiving side of its event stream.
    ///
    /// The stream always ends with a `complete` or `error` event unless the
    /// receiver is dropped first.
    pub fn stream(&self, request: ChatRequest) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);
        let id = ConversationId::resolve(request.conversation_id.as_deref());

        info!(
            conversation_id = %id,
            voice = request.voice,
            messages = request.messages.len(),
            "Starting conversation run"
        );

        let run = Run {
            sink: EventSink {
                tx: tx.clone(),
                id: id.clone(),
            },
            conversation: Conversation::seeded(
                id.clone(),
                &self.system_prompt,
                request.to_messages(),
            ),
            provider: self.provider.clone(),
            gateway: self.tools.clone(),
            tools: Vec::new(),
            round: 0,
            max_rounds: self.max_rounds,
        };

        let handle = tokio::spawn(run.drive());

        // Supervisor: a panicking run still ends the stream with an error.
        tokio::spawn(async move {
            match handle.await {
                Ok(state) => info!(conversation_id = %id, ?state, "Conversation run finished"),
                Err(join_error) if join_error.is_panic() => {
                    error!(conversation_id = %id, "Conversation run panicked");
                    let _ = tx
                        .send(ChatEvent::error(
                            &id,
                            "Internal error while processing the conversation",
                        ))
                        .await;
                }
                Err(_) => debug!(conversation_id = %id, "Conversation run aborted"),
            }
        });

        rx
    }
}

/// Where a run is.
#[derive(Debug)]
pub enum RunState {
    AwaitingTools,
    Streaming,
    DispatchingTools {
        calls: Vec<PendingToolCall>,
        text: String,
    },
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// The consumer went away.
struct Disconnected;

struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
    id: ConversationId,
}

impl EventSink {
    async fn emit(&self, event: ChatEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Run {
    sink: EventSink,
    conversation: Conversation,
    provider: Arc<dyn Provider>,
    gateway: Arc<dyn ToolGateway>,
    tools: Vec<ToolDescriptor>,
    round: u32,
    max_rounds: u32,
}

impl Run {
    async fn drive(mut self) -> RunState {
        if self.sink.emit(ChatEvent::connected(&self.sink.id)).await.is_err() {
            return RunState::Cancelled;
        }

        let mut state = RunState::AwaitingTools;
        while !state.is_terminal() {
            state = self.step(state).await;
        }
        state
    }

    async fn step(&mut self, state: RunState) -> RunState {
        match state {
            RunState::AwaitingTools => self.load_tools().await,
            RunState::Streaming => self.stream_round().await,
            RunState::DispatchingTools { calls, text } => self.dispatch(calls, text).await,
            terminal => terminal,
        }
    }

    async fn load_tools(&mut self) -> RunState {
        if self.sink.is_closed() {
            return RunState::Cancelled;
        }

        match self.gateway.list_tools().await {
            Ok(tools) => {
                debug!(conversation_id = %self.sink.id, count = tools.len(), "Loaded tool catalogue");
                self.tools = tools;
            }
            Err(e) => {
                warn!(conversation_id = %self.sink.id, error = %e, "Failed to load tool catalogue");
                self.tools = Vec::new();
            }
        }
        RunState::Streaming
    }

    async fn stream_round(&mut self) -> RunState {
        self.round += 1;
        if self.round > self.max_rounds {
            let message = format!(
                "Stopped after {} completion rounds without a final answer",
                self.max_rounds
            );
            return self.fail(message).await;
        }
        if self.sink.is_closed() {
            return RunState::Cancelled;
        }

        debug!(
            conversation_id = %self.sink.id,
            round = self.round,
            messages = self.conversation.messages.len(),
            "Opening completion stream"
        );

        let request = ProviderRequest {
            messages: self.conversation.messages.clone(),
            tools: self.tools.clone(),
        };
        let mut chunks = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return self.fail(e.to_string()).await,
        };

        let mut text = String::new();
        let mut pending = PendingToolCalls::new();

        loop {
            let item = tokio::select! {
                item = chunks.recv() => item,
                _ = self.sink.tx.closed() => return RunState::Cancelled,
            };

            let chunk = match item {
                None => break,
                Some(Err(e)) => return self.fail(e.to_string()).await,
                Some(Ok(chunk)) => chunk,
            };

            for choice in chunk.choices {
                for fragment in choice.text {
                    text.push_str(&fragment);
                    if self
                        .sink
                        .emit(ChatEvent::token(&self.sink.id, fragment))
                        .await
                        .is_err()
                    {
                        return RunState::Cancelled;
                    }
                }

                for fragment in &choice.tool_calls {
                    pending.merge(fragment);
                }

                match choice.finish_reason {
                    None => {}
                    Some(FinishReason::ToolCalls) if pending.is_empty() => {
                        debug!(
                            conversation_id = %self.sink.id,
                            "tool_calls finish without pending calls; still reading"
                        );
                    }
                    Some(FinishReason::ToolCalls) => {
                        return RunState::DispatchingTools {
                            calls: pending.into_calls(),
                            text,
                        };
                    }
                    Some(reason) => {
                        debug!(conversation_id = %self.sink.id, ?reason, "Completion finished");
                        return self.complete(text, true).await;
                    }
                }
            }

            if pending.has_complete() {
                debug!(
                    conversation_id = %self.sink.id,
                    calls = pending.len(),
                    "Tool call ready; leaving stream early"
                );
                break;
            }
        }

        if pending.is_empty() {
            self.complete(text, false).await
        } else {
            RunState::DispatchingTools {
                calls: pending.into_calls(),
                text,
            }
        }
    }

    async fn dispatch(&mut self, calls: Vec<PendingToolCall>, text: String) -> RunState {
        let mut round_text = Some(text).filter(|t| !t.is_empty());

        for call in calls {
            if call.name.is_empty() {
                warn!(conversation_id = %self.sink.id, call_id = %call.id, "Skipping tool call without a name");
                continue;
            }

            let calling = ChatEvent::status(&self.sink.id, format!("Calling {}…", call.name));
            if self.sink.emit(calling).await.is_err() || self.sink.is_closed() {
                return RunState::Cancelled;
            }

            debug!(conversation_id = %self.sink.id, tool = %call.name, "Invoking tool");
            let payload = match self
                .gateway
                .call_tool(&call.name, call.parsed_arguments())
                .await
            {
                Ok(payload) => payload,
                Err(e) => {
                    return self.fail(format!("Tool {} failed: {e}", call.name)).await;
                }
            };

            self.conversation.push(Message::tool_request(
                round_text.take().unwrap_or_default(),
                call.to_message_call(),
            ));
            self.conversation
                .push(Message::tool_result(call.id.clone(), serialize_payload(&payload)));

            let completed = ChatEvent::status(&self.sink.id, format!("Tool {} completed", call.name));
            if self.sink.emit(completed).await.is_err() {
                return RunState::Cancelled;
            }
        }

        RunState::Streaming
    }

    /// Finish the run with the round's text. `always_record` keeps an empty
    /// answer in the transcript.
    async fn complete(&mut self, text: String, always_record: bool) -> RunState {
        if always_record || !text.is_empty() {
            self.conversation.push(Message::assistant(text.clone()));
        }
        match self.sink.emit(ChatEvent::complete(&self.sink.id, text)).await {
            Ok(()) => RunState::Done,
            Err(Disconnected) => RunState::Cancelled,
        }
    }

    async fn fail(&mut self, message: String) -> RunState {
        error!(conversation_id = %self.sink.id, round = self.round, error = %message, "Conversation run failed");
        match self.sink.emit(ChatEvent::error(&self.sink.id, message)).await {
            Ok(()) => RunState::Failed,
            Err(Disconnected) => RunState::Cancelled,
        }
    }
}

fn serialize_payload(payload: &ToolPayload) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| {
        serde_json::json!({ "result": format!("{payload:?}") }).to_string()
    })
}
