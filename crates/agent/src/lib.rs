//! The conversation loop of hassAI.
//!
//! A run follows a **Stream → Accumulate → Dispatch** cycle:
//!
//! 1. **Seed** the conversation with the system directive and the caller's messages
//! 2. **Load** the tool catalogue once (failure means no tools, not no answer)
//! 3. **Stream** a completion, forwarding text as `token` events
//! 4. **Accumulate** tool-call fragments until a call is ready
//! 5. **Dispatch** the calls in order, append results, loop back to step 3
//!
//! The loop ends when the model finishes without tool calls, a tool fails,
//! the completion stream fails, or the consumer goes away.

pub mod orchestrator;
pub mod pending;
pub mod prompt;
pub mod request;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::{Orchestrator, RunState};
pub use pending::{PendingToolCall, PendingToolCalls};
pub use prompt::DEFAULT_SYSTEM_PROMPT;
pub use request::{ChatRequest, IncomingMessage};
pub use stream_event::{ChatEvent, ChatEventKind};
