//! Webhook relay loop: each text message in a batch is completed, then answered.

use crate::channels::{InboundMessage, LineError, LineEvent, LineSource, ReplySender};
use crate::llm::{CompletionError, Completer};
use crate::prompts::PromptLog;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Reply(#[from] LineError),
}

/// Everything needed to answer one webhook batch.
#[derive(Clone)]
pub struct Relay {
    pub completer: Arc<dyn Completer>,
    pub sender: Arc<dyn ReplySender>,
    pub model: String,
    pub max_tokens: u32,
    /// Set when debug is on; every exchange is recorded here.
    pub prompt_log: Option<PromptLog>,
}

impl Relay {
    /// Process events in order, one at a time. Returns how many were answered.
    ///
    /// Stops at the first failure. Replies already sent for earlier events in the
    /// batch stay sent.
    pub async fn handle_events(&self, events: &[LineEvent]) -> Result<usize, RelayError> {
        let mut answered = 0;
        for event in events {
            let Some(msg) = InboundMessage::from_event(event) else {
                log::debug!(
                    "webhook: skipping {} event from {} (mode {})",
                    event.typ,
                    event
                        .source
                        .as_ref()
                        .map_or_else(|| "unknown source".to_string(), LineSource::describe),
                    event.mode.as_deref().unwrap_or("unset")
                );
                continue;
            };
            self.answer(&msg).await?;
            answered += 1;
        }
        Ok(answered)
    }

    async fn answer(&self, msg: &InboundMessage) -> Result<(), RelayError> {
        let reply = match self
            .completer
            .complete(&msg.text, &self.model, self.max_tokens)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                if let Some(ref log) = self.prompt_log {
                    log.record_failure(msg.text.clone(), None, e.to_string()).await;
                }
                return Err(e.into());
            }
        };
        let sent = self.sender.send_reply(&msg.reply_token, &reply).await;
        if let Some(ref log) = self.prompt_log {
            match sent {
                Ok(()) => log.record(msg.text.clone(), reply).await,
                Err(ref e) => {
                    log.record_failure(msg.text.clone(), Some(reply), e.to_string())
                        .await
                }
            }
        }
        sent.map_err(RelayError::from)
    }
}
