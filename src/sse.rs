// src/sse.rs
//
// Server-Sent Events decoding for OpenAI-compatible chat completion streams.
// Bytes go in, `choices[0].delta.content` fragments come out, in read order.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::{stream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::types::OpenAIStreamResponse;

pub const DONE_SENTINEL: &str = "[DONE]";
const DATA_FIELD: &str = "data:";
const EVENT_DELIMITER: &str = "\n\n";

/// Why a stream stopped producing fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The byte stream reported completion.
    Finished,
    /// A read failed; everything decoded before it was delivered.
    ReadError,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Receives decoded fragments, then exactly one completion call.
pub trait SseHandler {
    fn on_chunk(&mut self, chunk: &str);
    fn on_done(&mut self, end: StreamEnd);
}

/// Incremental decoder. Partial UTF-8 sequences and partial events are
/// carried between `feed` calls.
#[derive(Debug, Default)]
pub struct SseDecoder {
    undecoded: Vec<u8>,
    buffer: String,
    saw_done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `[DONE]` event has been seen.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Feed one read worth of bytes and return the content fragments of every
    /// event completed by it.
    ///
    /// A `[DONE]` event ends processing of the events completed by this read;
    /// events arriving in later reads are still decoded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        // The retained buffer holds no complete delimiter, so only the tail
        // that can pair with new text needs scanning.
        let mut scan_from = self.buffer.len().saturating_sub(EVENT_DELIMITER.len() - 1);
        self.decode_utf8(bytes);
        while !self.buffer.is_char_boundary(scan_from) {
            scan_from -= 1;
        }

        let mut fragments = Vec::new();
        let Some(last) = self.buffer[scan_from..]
            .rfind(EVENT_DELIMITER)
            .map(|i| scan_from + i)
        else {
            return fragments;
        };

        let rest = self.buffer.split_off(last + EVENT_DELIMITER.len());
        let complete = std::mem::replace(&mut self.buffer, rest);

        for event in complete.split(EVENT_DELIMITER) {
            let Some(data) = event_data(event) else {
                continue;
            };

            if data == DONE_SENTINEL {
                self.saw_done = true;
                break;
            }

            match serde_json::from_str::<OpenAIStreamResponse>(&data) {
                Ok(parsed) => {
                    if let Some(content) = parsed.into_content() {
                        fragments.push(content);
                    }
                }
                Err(e) => tracing::warn!("[sse] skipping malformed event: {e}"),
            }
        }

        fragments
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.undecoded.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.undecoded.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.undecoded[..valid]));

                    match e.error_len() {
                        // Truncated sequence at the end: wait for the next read.
                        None => {
                            self.undecoded.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

/// The joined `data:` lines of one event, or `None` when it has none.
fn event_data(event: &str) -> Option<String> {
    let mut data: Option<String> = None;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(value) = line.strip_prefix(DATA_FIELD) else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match data.as_mut() {
            Some(d) => {
                d.push('\n');
                d.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    data
}

struct ReadState<S> {
    bytes: S,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    end: Option<StreamEnd>,
}

/// Lazily decode a byte stream into content fragments. The returned stream
/// yields `Ok(fragment)` items and finishes with one `Err(StreamEnd)` item
/// saying why it stopped.
pub fn content_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, StreamEnd>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = ReadState {
        bytes,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        end: None,
    };

    stream::unfold(Some(state), |state| async move {
        let mut st = state?;
        loop {
            if let Some(fragment) = st.ready.pop_front() {
                return Some((Ok(fragment), Some(st)));
            }
            if let Some(end) = st.end {
                return Some((Err(end), None));
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let fragments = st.decoder.feed(chunk.as_ref());
                    st.ready.extend(fragments);
                }
                Some(Err(e)) => {
                    tracing::warn!("[sse] read failed, ending stream: {e}");
                    st.end = Some(StreamEnd::ReadError);
                }
                None => {
                    if !st.decoder.buffer.trim().is_empty() {
                        tracing::debug!("[sse] discarding unterminated trailing event");
                    }
                    st.end = Some(StreamEnd::Finished);
                }
            }
        }
    })
}

/// Drive `bytes` to completion, relaying fragments to `handler` in order.
/// `handler.on_done` is called exactly once, whatever ended the stream.
/// Cancelling `cancel` ends the stream even while a read is pending.
pub async fn parse_sse_response<S, B, E, H>(bytes: S, cancel: &CancellationToken, handler: &mut H)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    H: SseHandler + ?Sized,
{
    let fragments = content_stream(bytes);
    futures::pin_mut!(fragments);

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            next = fragments.next() => match next {
                Some(Ok(fragment)) => handler.on_chunk(&fragment),
                Some(Err(end)) => break end,
                None => break StreamEnd::Finished,
            },
        }
    };

    handler.on_done(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        done: Vec<StreamEnd>,
    }

    impl SseHandler for Recorder {
        fn on_chunk(&mut self, chunk: &str) {
            self.chunks.push(chunk.to_string());
        }

        fn on_done(&mut self, end: StreamEnd) {
            self.done.push(end);
        }
    }

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    async fn run(reads: Vec<Result<Vec<u8>, String>>) -> Recorder {
        let mut recorder = Recorder::default();
        parse_sse_response(stream::iter(reads), &CancellationToken::new(), &mut recorder).await;
        recorder
    }

    fn ok_reads(chunks: Vec<Vec<u8>>) -> Vec<Result<Vec<u8>, String>> {
        chunks.into_iter().map(Ok).collect()
    }

    #[tokio::test]
    async fn test_split_reads_match_single_read() {
        let body = format!(
            "{}{}{}{}data: [DONE]\n\n",
            event("Héllo"),
            event(" wörld "),
            event("😀🦀"),
            event("日本語")
        );
        let bytes = body.into_bytes();

        let whole = run(ok_reads(vec![bytes.clone()])).await;
        assert_eq!(whole.chunks, vec!["Héllo", " wörld ", "😀🦀", "日本語"]);
        assert_eq!(whole.done, vec![StreamEnd::Finished]);

        // One byte per read splits every multi-byte character.
        let per_byte = run(ok_reads(bytes.iter().map(|b| vec![*b]).collect())).await;
        assert_eq!(per_byte.chunks, whole.chunks);

        for size in [2, 3, 5, 7, 13] {
            let split = run(ok_reads(bytes.chunks(size).map(<[u8]>::to_vec).collect())).await;
            assert_eq!(split.chunks, whole.chunks, "chunk size {size}");
            assert_eq!(split.done, vec![StreamEnd::Finished]);
        }
    }

    #[tokio::test]
    async fn test_done_mid_buffer_with_trailing_bytes() {
        let body = format!("{}data: [DONE]\n\n{}partial", event("a"), event("b"));
        let rec = run(ok_reads(vec![body.into_bytes()])).await;

        assert_eq!(rec.chunks, vec!["a"]);
        assert_eq!(rec.done, vec![StreamEnd::Finished]);
    }

    #[tokio::test]
    async fn test_done_only_stops_the_current_read() {
        let first = format!("{}data: [DONE]\n\n{}", event("a"), event("dropped"));
        let second = event("late");
        let rec = run(ok_reads(vec![first.into_bytes(), second.into_bytes()])).await;

        assert_eq!(rec.chunks, vec!["a", "late"]);
        assert_eq!(rec.done.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let body = format!("{}data: {{not json\n\n{}", event("a"), event("b"));
        let rec = run(ok_reads(vec![body.into_bytes()])).await;
        assert_eq!(rec.chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_non_data_lines_and_empty_deltas_are_ignored() {
        let body = format!(
            ": keep-alive\n\nevent: message\n{}data: {}\n\ndata: {}\n\n",
            event("x"),
            r#"{"choices":[{"delta":{"content":""}}]}"#,
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
        );
        let rec = run(ok_reads(vec![body.into_bytes()])).await;
        assert_eq!(rec.chunks, vec!["x"]);
    }

    #[tokio::test]
    async fn test_read_error_still_completes_once() {
        let rec = run(vec![
            Ok(event("before").into_bytes()),
            Err("connection reset".to_string()),
            Ok(event("after").into_bytes()),
        ])
        .await;

        assert_eq!(rec.chunks, vec!["before"]);
        assert_eq!(rec.done, vec![StreamEnd::ReadError]);
    }

    #[tokio::test]
    async fn test_unterminated_trailing_event_is_dropped() {
        let body = format!("{}data: {}", event("a"), r#"{"choices":[{"delta":{"content":"b"}}]}"#);
        let rec = run(ok_reads(vec![body.into_bytes()])).await;
        assert_eq!(rec.chunks, vec!["a"]);
        assert_eq!(rec.done, vec![StreamEnd::Finished]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_delivery() {
        struct CancelAfterFirst {
            token: CancellationToken,
            inner: Recorder,
        }

        impl SseHandler for CancelAfterFirst {
            fn on_chunk(&mut self, chunk: &str) {
                self.inner.on_chunk(chunk);
                self.token.cancel();
            }

            fn on_done(&mut self, end: StreamEnd) {
                self.inner.on_done(end);
            }
        }

        let token = CancellationToken::new();
        let mut handler = CancelAfterFirst {
            token: token.clone(),
            inner: Recorder::default(),
        };
        let body = format!("{}{}", event("a"), event("b"));
        let reads: Vec<Result<Vec<u8>, String>> = vec![Ok(body.into_bytes())];
        parse_sse_response(stream::iter(reads), &token, &mut handler).await;

        assert_eq!(handler.inner.chunks, vec!["a"]);
        assert_eq!(handler.inner.done, vec![StreamEnd::Cancelled]);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_a_stalled_read() {
        let reads = stream::iter(vec![Ok::<_, String>(event("a").into_bytes())]).chain(stream::pending());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut recorder = Recorder::default();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            parse_sse_response(reads, &token, &mut recorder),
        )
        .await
        .expect("cancel should end a stalled read");

        assert_eq!(recorder.chunks, vec!["a"]);
        assert_eq!(recorder.done, vec![StreamEnd::Cancelled]);
    }

    #[test]
    fn test_delimiter_split_across_reads() {
        let mut decoder = SseDecoder::new();
        let body = event("split");
        let (head, tail) = body.split_at(body.len() - 1);

        assert!(decoder.feed(head.as_bytes()).is_empty());
        assert_eq!(decoder.feed(tail.as_bytes()), vec!["split"]);
    }

    #[test]
    fn test_large_event_over_many_small_reads() {
        let text = "ü".repeat(20_000);
        let body = event(&text);
        let mut decoder = SseDecoder::new();
        let mut fragments = Vec::new();
        for chunk in body.as_bytes().chunks(3) {
            fragments.extend(decoder.feed(chunk));
        }
        assert_eq!(fragments, vec![text]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut decoder = SseDecoder::new();
        let mut bytes = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"b\"}}]}\n\n");
        assert_eq!(decoder.feed(&bytes), vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_decoder_tracks_sentinel() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]\n\n").is_empty());
        assert!(decoder.saw_done());
    }
}
