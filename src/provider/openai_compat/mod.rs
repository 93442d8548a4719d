//! OpenAI-compatible chat completions API.
//!
//! Handles the public API (Direct) and deployment-scoped gateways (Gateway).

mod client;
pub(crate) mod request;
mod request_builder;
mod stream;
pub(crate) mod stream_handler;


pub use client::Relay;
pub use request::{CompletionBody, OpenAIMessage, OutboundRequest};

use crate::config::Config;
use crate::provider::types::ChatRequest;

/// Build the outbound request without sending it.
pub fn build_request(request: &ChatRequest, config: &Config) -> OutboundRequest {
    request_builder::build_request(request, config)
}
