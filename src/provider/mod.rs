//! Streaming relay for OpenAI-style chat completions.
//!
//! Builds the request for the configured backend variant, sends it, and
//! turns the event-stream response into a stream of generated text.
//!
//! # Example
//!
//! ```ignore
//! use chat_relay::provider::{ChatRequest, Relay};
//!
//! let relay = Relay::new(Arc::new(config));
//! let mut stream = relay.stream(&request).await?;
//! while let Some(bytes) = stream.next().await {
//!     out.write_all(&bytes?)?;
//! }
//! ```

mod backend;
mod error;
mod http;
mod openai_compat;
mod scope;
mod stream;
mod types;

pub use backend::BackendVariant;
pub use error::{ApiError, Error, TransportError};
pub use http::{SseEvent, SseFrame, SseParser};
pub use openai_compat::{CompletionBody, OpenAIMessage, OutboundRequest, Relay, build_request};
pub use scope::CancelScope;
pub use stream::{LogObserver, RelayObserver, RelayStream, TokenReader};
pub use types::*;
