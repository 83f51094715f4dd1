//! Messaging channel (LINE).
//!
//! Webhook payload types, signature verification, and the reply client. The
//! webhook handler talks to the platform through [`ReplySender`] only.

mod inbound;
mod line;
mod reply;
pub mod signature;

pub use inbound::InboundMessage;
pub use line::{
    LineChannel, LineError, LineEvent, LineMessage, LineSource, LineWebhookBody, SIGNATURE_HEADER,
};
pub use reply::ReplySender;
