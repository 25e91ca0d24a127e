//! `hassai chat`: run one conversation from the terminal.
//!
//! Tokens go to stdout as they arrive; conversation, status and error lines
//! go to stderr so the answer can be piped.

use std::io::Write;

use hassai_agent::{ChatEvent, ChatEventKind, ChatRequest, Orchestrator};
use hassai_config::AppConfig;
use tokio::sync::mpsc;

pub async fn run(
    message: String,
    conversation_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.ensure_complete()?;

    let orchestrator = Orchestrator::from_config(&config)?;

    let mut request = ChatRequest::from_user_text(message);
    if let Some(id) = conversation_id {
        request = request.with_conversation_id(id);
    }

    let rx = orchestrator.stream(request);
    let outcome = render(rx, &mut std::io::stdout(), &mut std::io::stderr()).await?;

    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed(reason) => Err(reason.into()),
        Outcome::Interrupted => Err("conversation ended without a final event".into()),
    }
}

/// How a rendered run ended.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Interrupted,
}

/// Print events until the run ends.
pub async fn render(
    mut rx: mpsc::Receiver<ChatEvent>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> std::io::Result<Outcome> {
    let mut streamed = false;

    while let Some(event) = rx.recv().await {
        match event.kind {
            ChatEventKind::Conversation => {
                writeln!(
                    err,
                    "conversation {}",
                    event.conversation_id.as_deref().unwrap_or("-")
                )?;
            }
            ChatEventKind::Token => {
                if let Some(text) = &event.content {
                    write!(out, "{text}")?;
                    out.flush()?;
                    streamed = true;
                }
            }
            ChatEventKind::Status => {
                if streamed {
                    writeln!(out)?;
                    streamed = false;
                }
                writeln!(err, "  · {}", event.content.as_deref().unwrap_or_default())?;
            }
            ChatEventKind::Complete => {
                // A final answer that never streamed as tokens is printed whole
                if !streamed {
                    if let Some(text) = &event.content {
                        write!(out, "{text}")?;
                    }
                }
                writeln!(out)?;
                return Ok(Outcome::Completed);
            }
            ChatEventKind::Error => {
                if streamed {
                    writeln!(out)?;
                }
                let reason = event.content.unwrap_or_else(|| "unknown error".into());
                writeln!(err, "error: {reason}")?;
                return Ok(Outcome::Failed(reason));
            }
        }
    }

    Ok(Outcome::Interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hassai_core::message::ConversationId;

    async fn rendered(events: Vec<ChatEvent>) -> (Outcome, String, String) {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = render(rx, &mut out, &mut err).await.unwrap();
        (
            outcome,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test]
    async fn tokens_go_to_stdout() {
        let id = ConversationId("c1".into());
        let (outcome, out, err) = rendered(vec![
            ChatEvent::connected(&id),
            ChatEvent::status(&id, "Calling light.turn_on…"),
            ChatEvent::status(&id, "Tool light.turn_on completed"),
            ChatEvent::token(&id, "Do"),
            ChatEvent::token(&id, "ne."),
            ChatEvent::complete(&id, "Done."),
        ])
        .await;

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(out, "Done.\n");
        assert!(err.contains("conversation c1"));
        assert!(err.contains("Calling light.turn_on…"));
    }

    #[tokio::test]
    async fn error_is_reported() {
        let id = ConversationId("c1".into());
        let (outcome, _, err) = rendered(vec![
            ChatEvent::connected(&id),
            ChatEvent::error(&id, "Tool light.turn_on failed: Entity not found"),
        ])
        .await;

        assert_eq!(
            outcome,
            Outcome::Failed("Tool light.turn_on failed: Entity not found".into())
        );
        assert!(err.contains("error: Tool light.turn_on failed"));
    }

    #[tokio::test]
    async fn closed_stream_without_final_event_is_interrupted() {
        let id = ConversationId("c1".into());
        let (outcome, _, _) = rendered(vec![ChatEvent::connected(&id)]).await;
        assert_eq!(outcome, Outcome::Interrupted);
    }
}
