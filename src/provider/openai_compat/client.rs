//! Streaming relay client for the chat completions API.

use super::request_builder::build_request;
use crate::config::Config;
use crate::provider::error::Error;
use crate::provider::http::HttpClient;
use crate::provider::scope::CancelScope;
use crate::provider::stream::{LogObserver, RelayObserver, RelayStream, TokenReader};
use crate::provider::types::ChatRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Relays chat completion requests and re-streams the generated text.
///
/// Calls are independent of each other; the client only shares the
/// read-only configuration and the connection pool.
#[derive(Clone)]
pub struct Relay {
    http: HttpClient,
    config: Arc<Config>,
    observer: Arc<dyn RelayObserver>,
    timeout: Duration,
}

impl Relay {
    /// Create a relay for the configured backend.
    pub fn new(config: Arc<Config>) -> Self {
        let http = HttpClient::new(config.connect_timeout());
        let timeout = config.timeout();
        Self {
            http,
            config,
            observer: Arc::new(LogObserver),
            timeout,
        }
    }

    /// Report skipped events to `observer` instead of the log.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the configured upper bound on a call's duration.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stream a chat completion.
    pub async fn stream(&self, request: &ChatRequest) -> Result<RelayStream, Error> {
        self.stream_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Stream a chat completion, aborting when `cancel` fires.
    ///
    /// Returns once response headers have arrived. On success the returned
    /// stream owns the connection; it is released when the stream ends,
    /// fails, is cancelled, or is dropped.
    pub async fn stream_with_cancel(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<RelayStream, Error> {
        let outbound = build_request(request, &self.config);

        tracing::debug!(
            backend = %self.config.api_type.id(),
            url = %outbound.url,
            model = %request.model,
            messages = outbound.body.messages.len(),
            temperature = outbound.body.temperature,
            "Chat completion stream request"
        );

        let scope = CancelScope::new(cancel, self.timeout);
        let body = self
            .http
            .post_stream(&outbound, &scope)
            .await
            .inspect_err(|e| tracing::debug!("Relay request failed: {e}"))?;

        Ok(TokenReader::new(body, scope, self.observer.clone()).into_stream())
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
