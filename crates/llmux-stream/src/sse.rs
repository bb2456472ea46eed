//! Incremental SSE line parser, generic over the byte-stream's error type so
//! it can sit in front of any HTTP client response stream.
//!
//! Mirrors the buffering/line-splitting approach used for provider SSE
//! streams elsewhere in this workspace: never assume a chunk boundary lines
//! up with an event boundary, and keep a configurable policy for whatever is
//! left in the buffer once the upstream connection closes.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;

/// Behavior once the underlying byte stream ends.
#[derive(Clone, Copy, Debug)]
pub struct SseParserOptions {
    /// Whether to flush a trailing buffer with no terminating newline as a
    /// final event. Most providers terminate every frame with `\n\n`, but a
    /// connection can close mid-frame.
    pub flush_remaining_on_close: bool,
}

impl Default for SseParserOptions {
    fn default() -> Self {
        Self {
            flush_remaining_on_close: true,
        }
    }
}

/// One parsed SSE frame, before any dialect-specific JSON interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    /// A `data:` line's payload, already `[DONE]`-filtered.
    Data(String),
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Parse SSE lines out of a byte stream, yielding [`SseFrame`]s.
pub fn parse_sse_lines<S, E>(
    byte_stream: S,
    options: SseParserOptions,
) -> impl Stream<Item = SseFrame> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };

                    if let Some(frame) = extract_sse_frame(line) {
                        return Some((frame, (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(_)) => return None,
                    None => {
                        if options.flush_remaining_on_close && !buffer.is_empty() {
                            let remainder = String::from_utf8_lossy(&buffer).trim().to_string();
                            buffer.clear();
                            if let Some(frame) = extract_sse_frame(&remainder) {
                                return Some((frame, (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn extract_sse_frame(line: &str) -> Option<SseFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    if data.is_empty() {
        return None;
    }
    Some(SseFrame::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn splits_event_across_chunk_boundary() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("data: {\"par")),
            Ok(Bytes::from("tial\":true}\n\n")),
        ];
        let stream = futures::stream::iter(chunks);
        let frames: Vec<SseFrame> = parse_sse_lines(stream, SseParserOptions::default())
            .collect()
            .await;
        assert_eq!(frames, vec![SseFrame::Data("{\"partial\":true}".to_string())]);
    }

    #[tokio::test]
    async fn done_sentinel_is_distinguished_from_data() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from("data: {\"a\":1}\n\ndata: [DONE]\n\n"))];
        let stream = futures::stream::iter(chunks);
        let frames: Vec<SseFrame> = parse_sse_lines(stream, SseParserOptions::default())
            .collect()
            .await;
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[tokio::test]
    async fn comments_and_non_data_fields_are_skipped() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Ok(Bytes::from(
            ": heartbeat\n\nevent: ping\n\ndata: {\"v\":1}\n\n",
        ))];
        let stream = futures::stream::iter(chunks);
        let frames: Vec<SseFrame> = parse_sse_lines(stream, SseParserOptions::default())
            .collect()
            .await;
        assert_eq!(frames, vec![SseFrame::Data("{\"v\":1}".to_string())]);
    }

    #[tokio::test]
    async fn remaining_buffer_flushed_when_connection_closes_mid_frame() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from("data: {\"trailing\":true}"))];
        let stream = futures::stream::iter(chunks);
        let frames: Vec<SseFrame> = parse_sse_lines(stream, SseParserOptions::default())
            .collect()
            .await;
        assert_eq!(frames, vec![SseFrame::Data("{\"trailing\":true}".to_string())]);
    }

    #[tokio::test]
    async fn remaining_buffer_dropped_when_flush_disabled() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from("data: {\"trailing\":true}"))];
        let stream = futures::stream::iter(chunks);
        let options = SseParserOptions {
            flush_remaining_on_close: false,
        };
        let frames: Vec<SseFrame> = parse_sse_lines(stream, options).collect().await;
        assert!(frames.is_empty());
    }
}
