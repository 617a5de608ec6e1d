//! Line-oriented decoding of streamed HTTP bodies.
//!
//! Both providers stream text as newline-delimited records: Ollama sends
//! one JSON object per line, OpenAI sends SSE `data:` lines. The byte
//! stream is re-chunked into complete lines here; each provider only
//! supplies a per-line parser.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream::BoxStream};

use crate::error_handler::{AiLlmError, Result};

/// What a single decoded line means for the text stream.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    /// A text delta to forward to the caller.
    Text(String),
    /// The provider signalled end of generation.
    Done,
    /// Keep-alive, empty delta or an ignored field.
    Skip,
}

/// Accumulates bytes and hands out complete UTF-8 lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and drains every complete line (without `\n`/`\r\n`).
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

struct State<S> {
    bytes: S,
    lines: LineBuffer,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

/// Turns a streamed HTTP body into a stream of text deltas.
///
/// The stream ends on the first [`LineEvent::Done`], on end of body, or
/// after yielding the first error. Dropping it drops the HTTP response,
/// which aborts the upstream generation.
pub(crate) fn text_stream<S, B, F>(bytes: S, parse: F) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    F: Fn(&str) -> Result<LineEvent> + Send + Sync + 'static,
{
    let state = State {
        bytes,
        lines: LineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold((state, parse), |(mut st, parse)| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, (st, parse)));
            }
            if st.finished {
                return None;
            }
            let lines = match st.bytes.next().await {
                Some(Ok(chunk)) => st.lines.push(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(AiLlmError::from(e)));
                    continue;
                }
                None => {
                    st.finished = true;
                    st.lines.finish().into_iter().collect()
                }
            };
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                match parse(&line) {
                    Ok(LineEvent::Text(t)) => st.pending.push_back(Ok(t)),
                    Ok(LineEvent::Skip) => {}
                    Ok(LineEvent::Done) => {
                        st.finished = true;
                        break;
                    }
                    Err(e) => {
                        st.finished = true;
                        st.pending.push_back(Err(e));
                        break;
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut b = LineBuffer::default();
        assert!(b.push(b"{\"a\":").is_empty());
        assert_eq!(b.push(b"1}\r\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(b.push(b":2}\n"), vec!["{\"b\":2}".to_string()]);
        assert_eq!(b.finish(), None);
    }

    #[test]
    fn keeps_trailing_partial_line() {
        let mut b = LineBuffer::default();
        b.push(b"one\ntwo");
        assert_eq!(b.finish().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn stops_at_done_marker() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"a\nb\n".to_vec()),
            Ok(b"stop\nc\n".to_vec()),
        ];
        let parse = |line: &str| {
            Ok(match line {
                "stop" => LineEvent::Done,
                other => LineEvent::Text(other.to_string()),
            })
        };
        let out: Vec<String> = text_stream(futures::stream::iter(chunks), parse)
            .filter_map(|r| async move { r.ok() })
            .collect()
            .await;
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }
}
