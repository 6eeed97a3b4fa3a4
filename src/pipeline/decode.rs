//! SSE decoding (raw chunks -> text tokens).
//!
//! Each logical line is `data: <json>` where the JSON carries
//! `choices[].delta.content`. `data: [DONE]` marks the end of the stream.
//! A line that fails to parse is skipped and counted; it never aborts the stream.

use crate::types::Token;
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";
const DONE_SIGNAL: &str = "[DONE]";

enum Frame {
    /// Blank line or bare `data:` (keep-alive padding).
    Empty,
    Done,
    Event(Value),
    Malformed(serde_json::Error),
}

fn classify(raw: &str) -> Frame {
    let line = raw.trim();
    if line == DONE_SIGNAL || line == "data: [DONE]" {
        return Frame::Done;
    }
    let payload = match line.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim(),
        None => line,
    };
    if payload.is_empty() {
        return Frame::Empty;
    }
    match serde_json::from_str(payload) {
        Ok(v) => Frame::Event(v),
        Err(e) => Frame::Malformed(e),
    }
}

fn push_tokens(event: &Value, out: &mut Vec<Token>) {
    let Some(choices) = event.get("choices").and_then(Value::as_array) else {
        return;
    };
    for choice in choices {
        match choice.get("delta").and_then(|d| d.get("content")) {
            Some(Value::String(s)) => out.push(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => out.push(v.to_string()),
            _ => {}
        }
    }
}

/// Per-stream decoder state. Holds at most one incomplete trailing line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    partial: String,
    malformed: u64,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines skipped because they did not parse.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed
    }

    /// Decode one network chunk, in arrival order.
    ///
    /// A trailing fragment without a newline is decoded right away if it is
    /// already a whole frame; otherwise it waits for the next chunk. Text that
    /// later continues such a line is decoded as a line of its own.
    pub fn decode(&mut self, chunk: &str) -> Vec<Token> {
        self.partial.push_str(chunk);
        let mut out = Vec::new();

        while let Some(idx) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=idx).collect();
            self.decode_line(&line, &mut out);
        }

        if !self.partial.is_empty() {
            match classify(&self.partial) {
                Frame::Event(event) => {
                    push_tokens(&event, &mut out);
                    self.partial.clear();
                }
                Frame::Done => self.partial.clear(),
                Frame::Empty | Frame::Malformed(_) => {}
            }
        }

        out
    }

    /// Flush whatever is left once the input has ended.
    pub fn finish(&mut self) -> Vec<Token> {
        let mut out = Vec::new();
        if !self.partial.is_empty() {
            let rest = std::mem::take(&mut self.partial);
            self.decode_line(&rest, &mut out);
        }
        out
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<Token>) {
        match classify(line) {
            Frame::Event(event) => push_tokens(&event, out),
            Frame::Done | Frame::Empty => {}
            Frame::Malformed(e) => {
                self.malformed += 1;
                warn!(error = %e, line = line.trim(), "skipping malformed SSE line");
            }
        }
    }

    /// Decode a whole byte stream lazily. Transport errors are passed through in
    /// position; tokens already decoded before an error are emitted first.
    pub fn decode_stream(self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Token> {
        struct State {
            input: BoxStream<'static, Bytes>,
            decoder: SseDecoder,
            carry: Vec<u8>,
            pending: VecDeque<Result<Token>>,
            eof: bool,
        }

        let init = State {
            input,
            decoder: self,
            carry: Vec::new(),
            pending: VecDeque::new(),
            eof: false,
        };

        let stream = stream::unfold(init, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.eof {
                    return None;
                }

                match st.input.next().await {
                    Some(Ok(bytes)) => {
                        st.carry.extend_from_slice(&bytes);
                        let text = take_utf8(&mut st.carry);
                        st.pending.extend(st.decoder.decode(&text).into_iter().map(Ok));
                    }
                    Some(Err(e)) => {
                        st.pending.push_back(Err(e));
                    }
                    None => {
                        st.eof = true;
                        if !st.carry.is_empty() {
                            let tail = String::from_utf8_lossy(&st.carry).into_owned();
                            st.carry.clear();
                            st.pending.extend(st.decoder.decode(&tail).into_iter().map(Ok));
                        }
                        st.pending.extend(st.decoder.finish().into_iter().map(Ok));
                        debug!(
                            malformed_frames = st.decoder.malformed_frames(),
                            "SSE input finished"
                        );
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

/// Take the longest valid UTF-8 prefix, leaving an incomplete trailing code point
/// in `carry` for the next chunk.
fn take_utf8(carry: &mut Vec<u8>) -> String {
    match std::str::from_utf8(carry) {
        Ok(s) => {
            let s = s.to_string();
            carry.clear();
            s
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let s = String::from_utf8_lossy(&carry[..valid]).into_owned();
            carry.drain(..valid);
            s
        }
        Err(_) => {
            let s = String::from_utf8_lossy(carry).into_owned();
            carry.clear();
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    const HELLO: &str = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
    const WORLD: &str = r#"data: {"choices":[{"delta":{"content":" World"}}]}"#;

    #[test]
    fn test_done_alone_yields_nothing() {
        let mut d = SseDecoder::new();
        assert!(d.decode("data: [DONE]").is_empty());
        assert!(d.decode("[DONE]\n").is_empty());
        assert!(d.finish().is_empty());
        assert_eq!(d.malformed_frames(), 0);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut d = SseDecoder::new();
        let chunk = format!("{}\ndata: {{\"choices\": [oops\n{}\n", HELLO, WORLD);
        assert_eq!(d.decode(&chunk), vec!["Hello", " World"]);
        assert_eq!(d.malformed_frames(), 1);
    }

    #[test]
    fn test_multiple_lines_and_choices_keep_order() {
        let mut d = SseDecoder::new();
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}},{\"delta\":{\"content\":\"b\"}}]}\n",
            "  data:   {\"choices\":[{\"delta\":{\"content\":null}}]}  \n",
            "{\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n",
        );
        assert_eq!(d.decode(chunk), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut d = SseDecoder::new();
        let (head, tail) = HELLO.split_at(20);
        assert!(d.decode(head).is_empty());
        assert_eq!(d.decode(&format!("{}\n", tail)), vec!["Hello"]);
        assert!(d.finish().is_empty());
    }

    #[test]
    fn test_bare_prefix_waits_for_payload() {
        let mut d = SseDecoder::new();
        assert!(d.decode("data:").is_empty());
        assert_eq!(
            d.decode(r#" {"choices":[{"delta":{"content":"x"}}]}"#),
            vec!["x"]
        );
    }

    #[test]
    fn test_line_complete_chunks_without_newline() {
        let mut d = SseDecoder::new();
        assert_eq!(d.decode(HELLO), vec!["Hello"]);
        assert!(d.decode("data: [DONE]").is_empty());
    }

    #[test]
    fn test_finish_counts_truncated_tail() {
        let mut d = SseDecoder::new();
        assert!(d.decode("data: {\"choices\":[").is_empty());
        assert!(d.finish().is_empty());
        assert_eq!(d.malformed_frames(), 1);
    }

    #[test]
    fn test_empty_string_content_is_a_token() {
        let mut d = SseDecoder::new();
        let tokens = d.decode("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n");
        assert_eq!(tokens, vec![""]);
    }

    #[test]
    fn test_take_utf8_keeps_incomplete_code_point() {
        let bytes = "hé".as_bytes();
        let mut carry = bytes[..2].to_vec();
        assert_eq!(take_utf8(&mut carry), "h");
        assert_eq!(carry.len(), 1);
        carry.extend_from_slice(&bytes[2..]);
        assert_eq!(take_utf8(&mut carry), "é");
        assert!(carry.is_empty());
    }

    #[tokio::test]
    async fn test_decode_stream_flattens_chunks() {
        let chunks = vec![
            format!("{}\n\n{}", HELLO, &WORLD[..10]),
            format!("{}\n\n", &WORLD[10..]),
            "data: [DONE]\n\n".to_string(),
        ];
        let input = futures::stream::iter(chunks)
            .map(|s| Ok::<Bytes, crate::Error>(Bytes::from(s)));
        let tokens: Vec<_> = SseDecoder::new()
            .decode_stream(Box::pin(input))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Hello", " World"]);
    }

    #[tokio::test]
    async fn test_decode_stream_passes_errors_after_prior_tokens() {
        let items = vec![
            Ok(Bytes::from(format!("{}\n", HELLO))),
            Err(crate::Error::Transport(TransportError::Other("reset".into()))),
        ];
        let mut out = SseDecoder::new().decode_stream(Box::pin(futures::stream::iter(items)));
        assert_eq!(out.next().await.unwrap().unwrap(), "Hello");
        assert!(out.next().await.unwrap().is_err());
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_stream_handles_split_multibyte_char() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;
        let items = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ];
        let tokens: Vec<_> = SseDecoder::new()
            .decode_stream(Box::pin(futures::stream::iter(items)))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["héllo"]);
    }

    #[test]
    fn test_continuation_of_early_decoded_fragment_is_separate_line() {
        let mut d = SseDecoder::new();
        assert_eq!(d.decode(HELLO), vec!["Hello"]);
        assert!(d.decode(" trailing\n").is_empty());
        assert_eq!(d.malformed_frames(), 1);
        assert_eq!(d.decode(&format!("{}\n", WORLD)), vec![" World"]);
    }
}
