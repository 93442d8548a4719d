//! Server-Sent Events (SSE) parser.
//!
//! Follows the SSE specification for parsing event streams from LLM APIs.
//! Input is raw bytes in arbitrary chunks: a chunk may end mid-line or in the
//! middle of a multi-byte character, so lines are only decoded once their
//! terminator has arrived.

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// A dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (from `event:` line), if present.
    pub event: Option<String>,
    /// Last event id seen on the stream.
    pub id: Option<String>,
    /// Event data (from `data:` lines, joined with newlines).
    pub data: String,
}

/// Output of the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event(SseEvent),
    /// Reconnection time in milliseconds (from `retry:` line).
    Retry(u64),
}

/// Incremental SSE parser.
///
/// Buffers partial lines and the fields of the record being assembled, and
/// emits frames as soon as they are complete.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Previous chunk ended in `\r`; a leading `\n` belongs to that terminator.
    pending_cr: bool,
    bom_checked: bool,
    event: Option<String>,
    last_id: Option<String>,
    data: String,
    has_data: bool,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete frames.
    ///
    /// Lines end with `\n`, `\r\n` or `\r`. A blank line dispatches the
    /// record assembled so far. Supported fields:
    /// - `event: <type>` - event type
    /// - `data: <content>` - event data, may repeat
    /// - `id: <id>` - last event id
    /// - `retry: <ms>` - reconnection hint
    /// - `: <comment>` - ignored
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        let mut bytes = chunk;
        if self.pending_cr && !bytes.is_empty() {
            if let Some(rest) = bytes.strip_prefix(b"\n") {
                bytes = rest;
            }
            self.pending_cr = false;
        }
        self.buffer.extend_from_slice(bytes);

        if !self.bom_checked {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return frames;
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len());
            }
            self.bom_checked = true;
        }

        let mut start = 0;
        while let Some(offset) = self.buffer[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let end = start + offset;
            let mut next = end + 1;
            if self.buffer[end] == b'\r' {
                if next == self.buffer.len() {
                    self.pending_cr = true;
                } else if self.buffer[next] == b'\n' {
                    next += 1;
                }
            }

            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = next;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment line, ignore
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    return value.parse().ok().map(SseFrame::Retry);
                }
            }
            other => tracing::trace!(field = other, "Ignoring unknown SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseFrame::Event(SseEvent {
            event,
            id: self.last_id.clone(),
            data: std::mem::take(&mut self.data),
        }))
    }

    /// Signal end of input. A record without its terminating blank line is
    /// discarded; returns whether anything was dropped.
    pub fn finish(&mut self) -> bool {
        let dropped = self.has_pending();
        self.clear();
        dropped
    }

    /// Clear the internal buffer and any partially assembled record.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_cr = false;
        self.event = None;
        self.data.clear();
        self.has_data = false;
    }

    /// Check if there's pending data in the buffer.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_data
    }
}
