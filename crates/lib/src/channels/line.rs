//! LINE channel: webhook payload types and the reply API client.

use crate::channels::reply::ReplySender;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const LINE_API_BASE: &str = "https://api.line.me";

/// Header carrying the base64 HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Webhook POST body.
#[derive(Debug, Deserialize)]
pub struct LineWebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

/// One webhook event. Only `message` events carrying a text message are relayed;
/// other kinds (follow, postback, sticker messages, ...) still deserialize.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<LineMessage>,
    #[serde(default)]
    pub source: Option<LineSource>,
    /// "active" or "standby"; standby events carry no reply token.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineMessage {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl LineSource {
    /// "user:U123", "group:G456", ... for logs. Falls back to the bare type.
    pub fn describe(&self) -> String {
        let id = self
            .user_id
            .as_deref()
            .or(self.group_id.as_deref())
            .or(self.room_id.as_deref());
        match id {
            Some(id) => format!("{}:{}", self.typ, id),
            None => self.typ.clone(),
        }
    }
}

impl LineEvent {
    /// True for a message event whose message is text.
    pub fn is_text_message(&self) -> bool {
        self.typ == "message"
            && self
                .message
                .as_ref()
                .map_or(false, |m| m.typ == "text")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    text: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line reply failed: {0}")]
    Api(String),
}

/// LINE Messaging API client (reply only).
#[derive(Clone)]
pub struct LineChannel {
    api_base: String,
    access_token: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(api_base: Option<String>, access_token: impl Into<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            api_base,
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST /v2/bot/message/reply with a single text message.
    pub async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = ReplyRequest {
            reply_token,
            messages: vec![TextMessage { typ: "text", text }],
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LineError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySender for LineChannel {
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        LineChannel::send_reply(self, reply_token, text).await
    }
}
