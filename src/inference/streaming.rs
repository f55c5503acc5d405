//! SSE streaming: framing, the stream handle, and fragment decoding.
//!
//! Reads the HTTP body as a byte stream, splits on SSE boundaries
//! (`data: …\n\n`), parses each event as a `ChatCompletionChunk`, and turns
//! chunks into [`TextFragment`]s. Malformed chunks are skipped, never fatal.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ChatCompletionChunk, TextFragment};

/// Model name reported by offline handles.
pub const OFFLINE_MODEL: &str = "offline-mock";

// ─── Stream Handle ───────────────────────────────────────────────────────────

/// A single-use, in-progress completion stream.
///
/// Owned by whoever opened it. Dropping it (or calling [`close`](Self::close))
/// releases the underlying connection; it cannot be restarted.
pub struct StreamHandle {
    model: String,
    source: HandleSource,
}

enum HandleSource {
    /// Live SSE body from the provider.
    Remote(BoxStream<'static, Result<ChatCompletionChunk, InferenceError>>),
    /// Deterministic single-chunk reply; `None` once delivered.
    Offline(Option<ChatCompletionChunk>),
}

impl StreamHandle {
    pub(crate) fn remote(
        model: impl Into<String>,
        chunks: BoxStream<'static, Result<ChatCompletionChunk, InferenceError>>,
    ) -> Self {
        Self {
            model: model.into(),
            source: HandleSource::Remote(chunks),
        }
    }

    /// A handle that yields exactly one chunk carrying `content`.
    pub fn offline(content: impl Into<String>) -> Self {
        Self {
            model: OFFLINE_MODEL.to_string(),
            source: HandleSource::Offline(Some(ChatCompletionChunk::from_text(content))),
        }
    }

    /// The model identifier the stream was opened for.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.source, HandleSource::Offline(_))
    }

    /// Abandon the stream before it is exhausted.
    pub fn close(self) {
        tracing::debug!(model = %self.model, "stream handle closed");
    }
}

impl Stream for StreamHandle {
    type Item = Result<ChatCompletionChunk, InferenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().source {
            HandleSource::Remote(chunks) => chunks.poll_next_unpin(cx),
            HandleSource::Offline(chunk) => Poll::Ready(chunk.take().map(Ok)),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("model", &self.model)
            .field("offline", &self.is_offline())
            .finish()
    }
}

// ─── Decoder ─────────────────────────────────────────────────────────────────

/// Lazily decode a handle into text fragments, in arrival order.
///
/// - chunks without `choices[0].delta.content` (or with empty content) are skipped
/// - `MalformedChunk` errors are skipped
/// - any other error is yielded; fragments already yielded stay valid
///
/// The stream ends when the handle is exhausted.
pub fn decode_fragments(
    handle: StreamHandle,
) -> impl Stream<Item = Result<TextFragment, InferenceError>> + Send + 'static {
    handle.filter_map(|item| {
        futures::future::ready(match item {
            Ok(chunk) => chunk.first_fragment().map(Ok),
            Err(e) if e.is_malformed_chunk() => {
                tracing::debug!(error = %e, "skipping malformed chunk");
                None
            }
            Err(e) => Some(Err(e)),
        })
    })
}

/// Drain a handle and concatenate every fragment.
pub async fn collect_text(handle: StreamHandle) -> Result<String, InferenceError> {
    let fragments = decode_fragments(handle);
    futures::pin_mut!(fragments);

    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

// ─── SSE framing ─────────────────────────────────────────────────────────────

/// Parse raw SSE bytes into `ChatCompletionChunk`s.
///
/// 1. Buffers bytes until a blank line closes an event
/// 2. Joins the event's `data:` lines
/// 3. Parses the payload as a `ChatCompletionChunk`
///
/// `[DONE]` ends the stream. A read error is yielded once and ends the stream.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
) -> BoxStream<'static, Result<ChatCompletionChunk, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<InferenceError> + Send + 'static,
{
    let state = SseState {
        byte_stream: Box::pin(byte_stream),
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            // Drain complete events already buffered
            if let Some(event) = state.next_event() {
                match classify_event(&event) {
                    SseEvent::Data(data) => return Some((decode_chunk(&data), state)),
                    SseEvent::Done => {
                        state.finished = true;
                        return None;
                    }
                    SseEvent::Empty => continue, // keep-alive or comment
                }
            }

            // Need more data from the stream
            match state.byte_stream.next().await {
                Some(Ok(bytes)) => state.push(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    // Stream ended; an unterminated final event still counts
                    state.finished = true;
                    let rest = String::from_utf8_lossy(&state.buffer).into_owned();
                    state.buffer.clear();
                    return match classify_event(&rest) {
                        SseEvent::Data(data) => Some((decode_chunk(&data), state)),
                        SseEvent::Done | SseEvent::Empty => None,
                    };
                }
            }
        }
    })
    .boxed()
}

/// Mutable state for reassembling events across network reads.
struct SseState<S> {
    byte_stream: Pin<Box<S>>,
    /// Raw bytes, `\r` stripped. Kept as bytes so a UTF-8 sequence split
    /// across reads is decoded only once complete.
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> SseState<S> {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Pop the next complete event (text before a blank line), if any.
    fn next_event(&mut self) -> Option<String> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(String::from_utf8_lossy(&event[..end]).into_owned())
    }
}

enum SseEvent {
    Data(String),
    Done,
    Empty,
}

/// Join the `data:` lines of one event. Other fields and comments are ignored.
fn classify_event(event: &str) -> SseEvent {
    let mut data_content = String::new();

    for line in event.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                return SseEvent::Done;
            }
            data_content.push_str(data);
        }
    }

    if data_content.is_empty() {
        SseEvent::Empty
    } else {
        SseEvent::Data(data_content)
    }
}

/// Parse one event payload.
///
/// Unparseable JSON becomes `MalformedChunk`; a provider `error` object becomes
/// `StreamError`.
fn decode_chunk(data: &str) -> Result<ChatCompletionChunk, InferenceError> {
    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| InferenceError::MalformedChunk {
            data: data.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(ref error) = chunk.error {
        return Err(InferenceError::StreamError {
            reason: format!(
                "provider error{}: {}",
                error
                    .kind
                    .as_deref()
                    .map(|k| format!(" ({k})"))
                    .unwrap_or_default(),
                error.message.as_deref().unwrap_or("unknown error")
            ),
        });
    }

    Ok(chunk)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sse_handle(parts: Vec<&'static str>) -> StreamHandle {
        let bytes = stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>));
        StreamHandle::remote("gpt-4o-mini", parse_sse_stream(bytes))
    }

    async fn fragments_of(handle: StreamHandle) -> Vec<String> {
        decode_fragments(handle)
            .map(|f| f.unwrap().into_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_malformed_shapes_are_skipped() {
        let handle = sse_handle(vec![
            "data: {}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        assert_eq!(fragments_of(handle).await, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn test_invalid_json_does_not_end_stream() {
        let handle = sse_handle(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
            "data: {not json\n\n",
            "data: [1, 2, 3]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
        ]);
        assert_eq!(fragments_of(handle).await, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_events_split_across_reads() {
        let handle = sse_handle(vec![
            "data: {\"choices\":[{\"de",
            "lta\":{\"content\":\"Sprint\"}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"content\":\" Review\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        assert_eq!(collect_text(handle).await.unwrap(), "Sprint Review");
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{2192} ok\"}}]}\n\n";
        let bytes = payload.as_bytes();
        // Split inside the two-byte 'é'
        let split = payload.find('\u{e9}').unwrap() + 1;
        let parts = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];
        let handle = StreamHandle::remote(
            "gpt-4o-mini",
            parse_sse_stream(stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>))),
        );
        assert_eq!(collect_text(handle).await.unwrap(), "caf\u{e9} \u{2192} ok");
    }

    #[tokio::test]
    async fn test_crlf_comments_and_done() {
        let handle = sse_handle(vec![
            ": keep-alive\r\n\r\n",
            "event: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n",
            "data: [DONE]\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        ]);
        assert_eq!(fragments_of(handle).await, vec!["x"]);
    }

    #[tokio::test]
    async fn test_unterminated_final_event() {
        let handle = sse_handle(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]);
        assert_eq!(fragments_of(handle).await, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_read_error_surfaces_after_fragments() {
        let parts: Vec<Result<&'static str, std::io::Error>> = vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n"),
        ];
        let handle = StreamHandle::remote("gpt-4o-mini", parse_sse_stream(stream::iter(parts)));
        let items: Vec<_> = decode_fragments(handle).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_str(), "partial");
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_provider_error_event() {
        let handle = sse_handle(vec![
            "data: {\"error\":{\"message\":\"Rate limit reached\",\"type\":\"requests\"}}\n\n",
        ]);
        let err = collect_text(handle).await.unwrap_err();
        assert!(err.is_provider_error());
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_offline_handle_yields_one_chunk() {
        let mut handle = StreamHandle::offline("[Mock] hello");
        assert!(handle.is_offline());
        assert_eq!(handle.model(), OFFLINE_MODEL);

        let first = handle.next().await.unwrap().unwrap();
        assert_eq!(first.first_delta_content(), Some("[Mock] hello"));
        assert!(handle.next().await.is_none());
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_yields_nothing() {
        let handle = sse_handle(vec![]);
        assert!(fragments_of(handle).await.is_empty());
    }
}
