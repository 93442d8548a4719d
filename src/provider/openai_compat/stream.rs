//! OpenAI-compatible streaming response types.

use serde::Deserialize;

/// Streaming chunk from OpenAI-compatible APIs.
///
/// Only the fields the relay acts on are modelled; everything else in the
/// payload is ignored.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

/// A choice in a streaming chunk.
#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    /// Absent or `null` on some final chunks.
    #[serde(default)]
    pub delta: Option<StreamDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content in a streaming choice.
#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}
