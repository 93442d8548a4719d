//! Relay error types.

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a relay call.
///
/// Raised at most once per call. Either the backend answered with a
/// recognizable error object, or something went wrong on the way there.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Upstream(ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// The structured backend error, if this is one.
    pub fn as_upstream(&self) -> Option<&ApiError> {
        match self {
            Self::Upstream(err) => Some(err),
            Self::Transport(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout(_)))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(TransportError::Http(err))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned an error: HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid value for header {0}")]
    InvalidHeader(String),
}

/// Error object returned by the backend on a non-success status.
///
/// Shape: `{"error": {"message", "type", "param", "code"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub param: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        } else if let Some(kind) = &self.error_type {
            write!(f, " (type: {kind})")?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl ApiError {
    /// Parse a backend error body, returning `None` if it is not the
    /// structured `{"error": {...}}` shape.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }
}

/// Azure reports numeric codes as strings, some deployments as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Build the terminal error for a non-success response body.
pub(crate) fn status_error(status: StatusCode, body: String) -> Error {
    match ApiError::parse(&body) {
        Some(api) => Error::Upstream(api),
        None => Error::Transport(TransportError::Status { status, body }),
    }
}
