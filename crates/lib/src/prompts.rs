//! In-memory debug log of prompts and what came back for them.
//!
//! Only written when `app.debug` is on. Never trimmed: it grows for the life of
//! the process.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One relayed exchange. `error` is set when the completion or the reply failed.
#[derive(Debug, Clone)]
pub struct PromptRecord {
    pub prompt: String,
    pub completion: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Shared prompt log; clones share the same records.
#[derive(Clone, Default)]
pub struct PromptLog {
    inner: Arc<RwLock<Vec<PromptRecord>>>,
}

impl PromptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exchange that was answered.
    pub async fn record(&self, prompt: impl Into<String>, completion: impl Into<String>) {
        self.push(prompt.into(), Some(completion.into()), None).await;
    }

    /// Record an exchange that failed. `completion` is set when only the reply failed.
    pub async fn record_failure(
        &self,
        prompt: impl Into<String>,
        completion: Option<String>,
        error: impl Into<String>,
    ) {
        self.push(prompt.into(), completion, Some(error.into())).await;
    }

    async fn push(&self, prompt: String, completion: Option<String>, error: Option<String>) {
        self.inner.write().await.push(PromptRecord {
            prompt,
            completion,
            error,
            at: Utc::now(),
        });
    }

    /// Snapshot of all records, oldest first.
    pub async fn records(&self) -> Vec<PromptRecord> {
        self.inner.read().await.clone()
    }

    /// Records rendered as a transcript, one `Human:` / `AI:` block per exchange.
    pub async fn render(&self) -> String {
        let records = self.inner.read().await;
        let mut out = String::new();
        for r in records.iter() {
            out.push_str(&format!("[{}]\n", r.at.format("%Y-%m-%d %H:%M:%S")));
            out.push_str("Human: ");
            out.push_str(&r.prompt);
            out.push('\n');
            if let Some(ref completion) = r.completion {
                out.push_str("AI: ");
                out.push_str(completion);
                out.push('\n');
            }
            if let Some(ref error) = r.error {
                out.push_str("Error: ");
                out.push_str(error);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Print the transcript to stdout. Returns the printed text (empty when nothing was printed).
    pub async fn print(&self) -> String {
        let transcript = self.render().await;
        if !transcript.is_empty() {
            println!("\n{}", transcript.trim_end());
        }
        transcript
    }
}
