//! Outbound request types for the chat completions API.

use crate::provider::types::Role;
use reqwest::header::HeaderName;
use serde::Serialize;

/// JSON body of a streaming chat completion request.
#[derive(Debug, Serialize)]
pub struct CompletionBody {
    pub messages: Vec<OpenAIMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    /// Omitted for the Gateway variant, which selects the model by deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OpenAIMessage {
    pub role: Role,
    pub content: String,
}

/// A fully formed request, ready to send.
///
/// Header values stay as text here; they are validated when the request
/// goes out on the wire.
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(HeaderName, String)>,
    pub body: CompletionBody,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<_> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if super::request_builder::is_secret_header(name) {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}
