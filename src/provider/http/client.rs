//! HTTP client wrapper for streaming completion requests.

use crate::provider::error::{Error, TransportError, status_error};
use crate::provider::openai_compat::request::OutboundRequest;
use crate::provider::scope::CancelScope;
use crate::provider::stream::BodyStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// HTTP client for LLM API requests.
///
/// Only a connect timeout is set on the underlying client. The total
/// duration of a call is bounded by its `CancelScope`, which also covers the
/// streamed body.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    /// Send `request` and return its body as a chunk stream.
    ///
    /// The request and, on failure, the error body read both run inside
    /// `scope`. A non-success status is turned into the terminal error.
    pub async fn post_stream(
        &self,
        request: &OutboundRequest,
        scope: &CancelScope,
    ) -> Result<BodyStream, Error> {
        let headers = build_headers(&request.headers)?;

        let send = self
            .client
            .post(&request.url)
            .headers(headers)
            .json(&request.body)
            .send();
        let response = scope.run(send).await??;

        let status = response.status();
        if !status.is_success() {
            let text = scope.run(response.text()).await?.unwrap_or_default();
            tracing::debug!(%status, body = %text, "Upstream rejected request");
            return Err(status_error(status, text));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(Error::from)),
        ))
    }
}

/// Encode header values. Fails on values that cannot go on the wire, such
/// as a credential containing a newline.
fn build_headers(headers: &[(HeaderName, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        map.insert(name.clone(), value);
    }
    Ok(map)
}
