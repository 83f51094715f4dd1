//! Reply seam between the webhook handler and the messaging platform.

use crate::channels::line::LineError;
use async_trait::async_trait;

/// Sends one reply for one inbound event.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Reply to the conversation bound to `reply_token`. Each token is used at most once.
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), LineError>;
}
