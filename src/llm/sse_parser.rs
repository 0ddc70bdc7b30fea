use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> DeskPilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| DeskPilotError::SseParsing(e.to_string()))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Some models (DeepSeek, Qwen thinking modes) stream their reasoning separately.
    if let Some(reasoning) = delta["reasoning_content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Reasoning,
            content: reasoning.to_string(),
        }));
    }

    if let Some(content) = delta["content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Content,
            content: content.to_string(),
        }));
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}

/// Reassembles an SSE byte stream into reasoning and content text. Bytes may
/// split lines (and UTF-8 sequences) at arbitrary points.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    pub content: String,
    pub reasoning: String,
    pub chunks: usize,
    pub done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns true once the stream signalled completion;
    /// anything after that is ignored.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if self.done {
            return true;
        }
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if self.push_line(line.trim()) {
                self.done = true;
                self.pending.clear();
                return true;
            }
        }
        false
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) {
        if self.done || self.pending.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).into_owned();
        if self.push_line(line.trim()) {
            self.done = true;
        }
    }

    fn push_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        match parse_sse_line(line) {
            Ok(Some(chunk)) => {
                self.chunks += 1;
                match chunk.kind {
                    StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                    StreamChunkKind::Content => self.content.push_str(&chunk.content),
                    StreamChunkKind::Done => return true,
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_reasoning_and_done_lines() {
        let content = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Reason:"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(content.kind, StreamChunkKind::Content);
        assert_eq!(content.content, "Reason:");

        let reasoning =
            parse_sse_line(r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#)
                .unwrap()
                .unwrap();
        assert_eq!(reasoning.kind, StreamChunkKind::Reasoning);

        let done = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert_eq!(done.kind, StreamChunkKind::Done);
    }

    #[test]
    fn keepalives_and_other_fields_are_skipped() {
        assert!(parse_sse_line(": keep-alive").unwrap().is_none());
        assert!(parse_sse_line("event: ping").unwrap().is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#)
            .unwrap()
            .is_none());
        assert!(matches!(parse_sse_line("data: {oops"), Err(DeskPilotError::SseParsing(_))));
    }

    #[test]
    fn accumulator_handles_split_lines() {
        let mut acc = SseAccumulator::new();
        let stream = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"look\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Reason: ok\\n\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Action: {}\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let bytes = stream.as_bytes();
        let mut finished = false;
        for piece in bytes.chunks(7) {
            finished = acc.push(piece);
        }
        assert!(finished);
        assert_eq!(acc.reasoning, "look");
        assert_eq!(acc.content, "Reason: ok\nAction: {}");
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut acc = SseAccumulator::new();
        acc.push(br#"data: {"choices":[{"delta":{"content":"tail"}}]}"#);
        assert_eq!(acc.content, "");
        acc.finish();
        assert_eq!(acc.content, "tail");
        assert!(!acc.done);
    }
}
