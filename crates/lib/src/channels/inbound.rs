//! Inbound message extracted from a webhook event: what the relay acts on.

use crate::channels::line::LineEvent;

/// A text message to be completed and answered through its reply token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub reply_token: String,
    pub text: String,
}

impl InboundMessage {
    /// Text message events with a reply token become inbound messages; everything else is `None`.
    pub fn from_event(event: &LineEvent) -> Option<Self> {
        if !event.is_text_message() {
            return None;
        }
        let text = event.message.as_ref()?.text.clone()?;
        let reply_token = event.reply_token.clone()?;
        Some(Self { reply_token, text })
    }
}
