//! Pull-based token stream over an upstream event-stream body.

use crate::provider::error::Error;
use crate::provider::http::{SseFrame, SseParser};
use crate::provider::openai_compat::stream_handler::{DeltaAction, classify};
use crate::provider::scope::CancelScope;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Output of a relay call: generated text as bytes, in upstream order.
///
/// Ends after the finish reason or upstream EOF. A cancellation, timeout or
/// body error is yielded once as the last item.
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Raw response body chunks.
pub(crate) type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Hook for non-fatal stream conditions.
pub trait RelayObserver: Send + Sync {
    /// An event payload failed to decode and was skipped.
    fn malformed_event(&self, data: &str, error: &serde_json::Error);

    /// The upstream sent a reconnection hint. The relay never reconnects.
    fn retry_hint(&self, _millis: u64) {}
}

/// Default observer: reports through `tracing`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl RelayObserver for LogObserver {
    fn malformed_event(&self, data: &str, error: &serde_json::Error) {
        warn!("Skipping malformed stream event: {error}\nData: {data}");
    }

    fn retry_hint(&self, millis: u64) {
        trace!(millis, "Ignoring SSE retry hint");
    }
}

/// Decodes tokens from a response body on demand.
///
/// Reads the next body chunk only once every frame decoded so far has been
/// consumed, so a slow consumer holds back the upstream read.
pub struct TokenReader {
    body: Option<BodyStream>,
    parser: SseParser,
    pending: VecDeque<SseFrame>,
    scope: CancelScope,
    observer: Arc<dyn RelayObserver>,
    emitted: usize,
}

impl TokenReader {
    pub(crate) fn new(body: BodyStream, scope: CancelScope, observer: Arc<dyn RelayObserver>) -> Self {
        Self {
            body: Some(body),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            scope,
            observer,
            emitted: 0,
        }
    }

    /// Decode the next token.
    ///
    /// `None` once the stream has ended, normally or after an error was
    /// returned.
    pub async fn next_token(&mut self) -> Option<Result<Bytes, Error>> {
        loop {
            self.body.as_ref()?;

            if let Err(e) = self.scope.check() {
                self.release("scope fired");
                return Some(Err(e.into()));
            }

            while let Some(frame) = self.pending.pop_front() {
                let event = match frame {
                    SseFrame::Event(event) => event,
                    SseFrame::Retry(millis) => {
                        self.observer.retry_hint(millis);
                        continue;
                    }
                };
                match classify(&event.data) {
                    DeltaAction::Emit(text) => {
                        self.emitted += 1;
                        return Some(Ok(Bytes::from(text)));
                    }
                    DeltaAction::Finish(reason) => {
                        debug!(%reason, "Upstream finished generation");
                        self.release("finished");
                        return None;
                    }
                    DeltaAction::Skip(reason) => trace!(?reason, "Skipping stream event"),
                    DeltaAction::Malformed(e) => self.observer.malformed_event(&event.data, &e),
                }
            }

            let Some(body) = self.body.as_mut() else {
                return None;
            };
            let next = self.scope.run(body.next()).await;
            match next {
                Ok(Some(Ok(chunk))) => {
                    let frames = self.parser.feed(&chunk);
                    self.pending.extend(frames);
                }
                Ok(Some(Err(e))) => {
                    self.release("body error");
                    return Some(Err(e));
                }
                Ok(None) => {
                    if self.parser.finish() {
                        debug!("Discarding unterminated event at end of body");
                    }
                    warn!("Upstream closed the stream without a finish reason");
                    self.release("end of body");
                    return None;
                }
                Err(e) => {
                    self.release("scope fired");
                    return Some(Err(e.into()));
                }
            }
        }
    }

    /// Number of tokens returned so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Turn the reader into the caller-facing byte stream.
    ///
    /// Fused: polling after the end keeps returning `None`.
    pub fn into_stream(self) -> RelayStream {
        Box::pin(
            futures::stream::unfold(self, |mut reader| async move {
                let item = reader.next_token().await?;
                Some((item, reader))
            })
            .fuse(),
        )
    }

    /// Drop the response body, closing the connection. Idempotent.
    fn release(&mut self, reason: &'static str) {
        if self.body.take().is_some() {
            self.pending.clear();
            self.parser.clear();
            debug!(reason, tokens = self.emitted, "Released upstream connection");
        }
    }
}

impl Drop for TokenReader {
    fn drop(&mut self) {
        self.release("dropped by consumer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::error::TransportError;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const LONG: Duration = Duration::from_secs(3600);

    /// Body that counts how often it is dropped.
    struct TrackedBody {
        inner: BodyStream,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for TrackedBody {
        type Item = Result<Bytes, Error>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Recorder {
        malformed: Mutex<Vec<String>>,
    }

    impl RelayObserver for Recorder {
        fn malformed_event(&self, data: &str, _error: &serde_json::Error) {
            self.malformed.lock().unwrap().push(data.to_string());
        }
    }

    fn content(text: &str) -> String {
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
            .to_string()
    }

    const ROLE: &str = r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
    const STOP: &str = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;

    fn sse(payloads: &[&str]) -> Vec<u8> {
        payloads
            .iter()
            .map(|p| format!("data: {p}\n\n"))
            .collect::<String>()
            .into_bytes()
    }

    struct Harness {
        reader: TokenReader,
        drops: Arc<AtomicUsize>,
        cancel: CancellationToken,
        recorder: Arc<Recorder>,
    }

    /// `keep_open` leaves the body pending after the chunks, like a live
    /// connection that has not sent anything new yet.
    fn harness(chunks: Vec<Vec<u8>>, keep_open: bool, timeout: Duration) -> Harness {
        let items = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, Error>(Bytes::from(c)))
                .collect::<Vec<_>>(),
        );
        let inner: BodyStream = if keep_open {
            Box::pin(items.chain(futures::stream::pending()))
        } else {
            Box::pin(items)
        };
        let drops = Arc::new(AtomicUsize::new(0));
        let body = TrackedBody {
            inner,
            drops: drops.clone(),
        };
        let cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder::default());
        let reader = TokenReader::new(
            Box::pin(body),
            CancelScope::new(&cancel, timeout),
            recorder.clone(),
        );
        Harness {
            reader,
            drops,
            cancel,
            recorder,
        }
    }

    async fn collect(reader: TokenReader) -> (String, Option<Error>) {
        let mut stream = reader.into_stream();
        let mut out = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(e) => error = Some(e),
            }
        }
        (String::from_utf8(out).unwrap(), error)
    }

    fn chunked(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
        bytes.chunks(size).map(<[u8]>::to_vec).collect()
    }

    #[tokio::test]
    async fn test_concatenates_tokens_until_finish() {
        let hello = content("Hello");
        let world = content(", world");
        let empty = content("");
        let after = content("never");
        let body = sse(&[ROLE, &empty, &hello, &world, STOP, &after]);
        let h = harness(vec![body], false, LONG);

        let (text, error) = collect(h.reader).await;
        assert_eq!(text, "Hello, world");
        assert!(error.is_none());
        assert_eq!(h.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_closes_live_connection() {
        // The connection stays open after the finish chunk; the stream must
        // still end rather than wait for more data.
        let a = content("a");
        let h = harness(vec![sse(&[&a, STOP])], true, LONG);
        let (text, error) = collect(h.reader).await;
        assert_eq!(text, "a");
        assert!(error.is_none());
        assert_eq!(h.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_with_null_delta_closes_live_connection() {
        let a = content("a");
        let stop = r#"{"choices":[{"index":0,"delta":null,"finish_reason":"stop"}]}"#;
        let h = harness(vec![sse(&[&a, stop])], true, LONG);
        let recorder = h.recorder.clone();
        let (text, error) = collect(h.reader).await;
        assert_eq!(text, "a");
        assert!(error.is_none());
        assert!(recorder.malformed.lock().unwrap().is_empty());
        assert_eq!(h.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_role_announcement_does_not_end_stream() {
        let x = content("x");
        let h = harness(vec![sse(&[ROLE, ROLE, &x, STOP])], false, LONG);
        let (text, _) = collect(h.reader).await;
        assert_eq!(text, "x");
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped_and_observed() {
        let one = content("one ");
        let two = content("two");
        let body = sse(&[&one, "{\"choices\": [", "[DONE]", &two, STOP]);
        let h = harness(vec![body], false, LONG);
        let recorder = h.recorder.clone();

        let (text, error) = collect(h.reader).await;
        assert_eq!(text, "one two");
        assert!(error.is_none());
        // The done marker is a sentinel, not a malformed event
        assert_eq!(*recorder.malformed.lock().unwrap(), vec!["{\"choices\": [".to_string()]);
    }

    #[tokio::test]
    async fn test_output_independent_of_chunking() {
        let parts = [content("Grüße"), content(" 世界"), content(" 🎉!"), content("")];
        let mut payloads: Vec<&str> = vec![ROLE];
        payloads.extend(parts.iter().map(String::as_str));
        payloads.push(STOP);
        let body = sse(&payloads);

        for size in [body.len(), 1, 2, 3, 4, 5, 7, 16] {
            let h = harness(chunked(&body, size), false, LONG);
            let (text, error) = collect(h.reader).await;
            assert_eq!(text, "Grüße 世界 🎉!", "chunk size {size}");
            assert!(error.is_none());
        }
    }

    #[tokio::test]
    async fn test_record_split_inside_multibyte_char() {
        let body = sse(&[&content("€"), STOP]);
        let euro = body.windows(3).position(|w| w == "€".as_bytes()).unwrap();
        let chunks = vec![
            body[..euro + 1].to_vec(),
            body[euro + 1..euro + 2].to_vec(),
            body[euro + 2..].to_vec(),
        ];
        let h = harness(chunks, false, LONG);
        let (text, _) = collect(h.reader).await;
        assert_eq!(text, "€");
    }

    #[tokio::test]
    async fn test_end_of_body_without_finish() {
        let a = content("partial");
        let mut body = sse(&[&a]);
        body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"lost\"}}]}");
        let h = harness(vec![body], false, LONG);
        let (text, error) = collect(h.reader).await;
        assert_eq!(text, "partial");
        assert!(error.is_none());
        assert_eq!(h.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_body_error_terminates_once() {
        let a = content("a");
        let items: Vec<Result<Bytes, Error>> = vec![
            Ok(Bytes::from(sse(&[&a]))),
            Err(TransportError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: "connection reset".into(),
            }
            .into()),
            Ok(Bytes::from(sse(&[&content("b")]))),
        ];
        let drops = Arc::new(AtomicUsize::new(0));
        let body = TrackedBody {
            inner: Box::pin(futures::stream::iter(items)),
            drops: drops.clone(),
        };
        let reader = TokenReader::new(
            Box::pin(body),
            CancelScope::new(&CancellationToken::new(), LONG),
            Arc::new(LogObserver),
        );

        let mut stream = reader.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_polled_after_finish() {
        let a = content("a");
        let h = harness(vec![sse(&[&a, STOP])], true, LONG);
        let mut stream = h.reader.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        for _ in 0..3 {
            assert!(stream.next().await.is_none());
        }
        assert_eq!(h.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_between_pulls() {
        let a = content("a");
        let b = content("b");
        let h = harness(vec![sse(&[&a, &b])], true, LONG);
        let drops = h.drops.clone();
        let cancel = h.cancel.clone();
        let mut reader = h.reader;

        assert_eq!(reader.next_token().await.unwrap().unwrap(), "a");
        cancel.cancel();
        // Already decoded "b" is not delivered after cancellation
        let err = reader.next_token().await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(reader.next_token().await.is_none());
        assert_eq!(reader.emitted(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(reader);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_chunk() {
        let a = content("a");
        let h = harness(vec![sse(&[&a])], true, LONG);
        let drops = h.drops.clone();
        let cancel = h.cancel.clone();
        let mut reader = h.reader;

        assert_eq!(reader.next_token().await.unwrap().unwrap(), "a");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let err = reader.next_token().await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_mid_stream() {
        let a = content("a");
        let h = harness(vec![sse(&[&a])], true, Duration::from_millis(50));
        let drops = h.drops.clone();
        let mut stream = h.reader.into_stream();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert!(stream.next().await.is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_connection() {
        let a = content("a");
        let h = harness(vec![sse(&[&a])], true, LONG);
        let drops = h.drops.clone();
        let mut stream = h.reader.into_stream();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reads_lazily() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let chunks: Vec<Result<Bytes, Error>> = ["first", "second", "third"]
            .iter()
            .map(|t| Ok(Bytes::from(sse(&[&content(t)]))))
            .collect();
        let body = futures::stream::iter(chunks).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut reader = TokenReader::new(
            Box::pin(body),
            CancelScope::new(&CancellationToken::new(), LONG),
            Arc::new(LogObserver),
        );

        assert_eq!(reader.next_token().await.unwrap().unwrap(), "first");
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert_eq!(reader.next_token().await.unwrap().unwrap(), "second");
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }
}
