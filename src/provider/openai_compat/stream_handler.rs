//! Token extraction from streamed completion chunks.

use super::stream::StreamChunk;

/// Data payload some backends send after the final chunk.
pub(crate) const DONE_MARKER: &str = "[DONE]";

/// What to do with one event payload.
#[derive(Debug)]
pub(crate) enum DeltaAction {
    /// Next piece of generated text.
    Emit(String),
    /// Generation finished; close the stream.
    Finish(String),
    /// Nothing to emit, keep reading.
    Skip(SkipReason),
    /// Payload was not valid JSON. Non-fatal.
    Malformed(serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    Sentinel,
    NoChoices,
    RoleAnnouncement,
    EmptyContent,
    NoContent,
}

/// Decode an event payload and apply the filtering policy to its first choice.
pub(crate) fn classify(data: &str) -> DeltaAction {
    if data.trim() == DONE_MARKER {
        return DeltaAction::Skip(SkipReason::Sentinel);
    }

    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return DeltaAction::Malformed(e),
    };

    let Some(choice) = chunk.choices.into_iter().next() else {
        return DeltaAction::Skip(SkipReason::NoChoices);
    };

    if let Some(reason) = choice.finish_reason
        && !reason.is_empty()
    {
        return DeltaAction::Finish(reason);
    }

    let delta = choice.delta.unwrap_or_default();
    if delta.role.as_deref() == Some("assistant") {
        return DeltaAction::Skip(SkipReason::RoleAnnouncement);
    }

    match delta.content {
        Some(text) if text.is_empty() => DeltaAction::Skip(SkipReason::EmptyContent),
        Some(text) => DeltaAction::Emit(text),
        None => DeltaAction::Skip(SkipReason::NoContent),
    }
}
