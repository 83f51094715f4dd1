//! Completion abstraction and the OpenAI client.

mod openai;

use async_trait::async_trait;

pub use openai::{CompletionError, OpenAiClient};

/// Something that turns a prompt into a single completion.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Request one completion for `prompt`. Returns the first choice, trimmed.
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;
}
