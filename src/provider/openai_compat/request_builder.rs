//! Request building for the chat completions API.

use super::request::{CompletionBody, OpenAIMessage, OutboundRequest};
use crate::config::Config;
use crate::provider::backend::BackendVariant;
use crate::provider::types::{ChatRequest, Role};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName};

pub(crate) const API_KEY: HeaderName = HeaderName::from_static("api-key");
pub(crate) const ORGANIZATION: HeaderName = HeaderName::from_static("openai-organization");

/// Build the outbound request for `request` against the configured backend.
///
/// Never fails. A missing or malformed credential is left for the backend
/// (or the header encoder) to reject.
pub(crate) fn build_request(request: &ChatRequest, config: &Config) -> OutboundRequest {
    let variant = config.api_type;
    let key = resolve_api_key(request, config);

    let mut headers = vec![
        (CONTENT_TYPE, "application/json".to_string()),
        (ACCEPT, "text/event-stream".to_string()),
    ];
    match variant {
        BackendVariant::Direct => headers.push((AUTHORIZATION, format!("Bearer {key}"))),
        BackendVariant::Gateway => headers.push((API_KEY, key)),
    }
    if variant.supports_organization()
        && let Some(org) = config.organization.as_deref().filter(|o| !o.is_empty())
    {
        headers.push((ORGANIZATION, org.to_string()));
    }

    OutboundRequest {
        url: build_url(config),
        headers,
        body: build_body(request, config),
    }
}

fn build_url(config: &Config) -> String {
    let host = config.api_host.trim_end_matches('/');
    match config.api_type {
        BackendVariant::Direct => format!("{host}/v1/chat/completions"),
        BackendVariant::Gateway => format!(
            "{host}/openai/deployments/{}/chat/completions?api-version={}",
            config.deployment_id.as_deref().unwrap_or_default(),
            config.api_version
        ),
    }
}

fn build_body(request: &ChatRequest, config: &Config) -> CompletionBody {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(OpenAIMessage {
        role: Role::System,
        content: request.system_prompt.clone(),
    });
    messages.extend(request.messages.iter().map(|m| OpenAIMessage {
        role: m.role,
        content: m.content.clone(),
    }));

    CompletionBody {
        messages,
        max_tokens: config.max_tokens,
        temperature: request.temperature,
        stream: true,
        model: config
            .api_type
            .sends_model()
            .then(|| request.model.clone()),
    }
}

fn resolve_api_key(request: &ChatRequest, config: &Config) -> String {
    request
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .or(config.api_key.as_deref())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn is_secret_header(name: &HeaderName) -> bool {
    *name == AUTHORIZATION || *name == API_KEY
}
