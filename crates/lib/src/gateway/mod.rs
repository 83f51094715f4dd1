//! Gateway: HTTP server for the LINE webhook and the info endpoints.
//!
//! Webhook requests are verified against the channel secret, then each text
//! message is relayed to the completion model and answered via the reply API.

mod server;
mod webhook;

pub use server::{router, run_gateway, GatewayState, InfoResponse};
pub use webhook::{Relay, RelayError};
