//! Output guard for upstream completions.
//!
//! Drops runaway-loop artifacts ("--- round N", "task complete"), leading
//! blank lines, and caps output at [`MAX_OUTPUT_LINES`] passing lines.

use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const MAX_OUTPUT_LINES: usize = 200;
pub const TRUNCATED_MARKER: &str = "[truncated]";
pub const STREAM_CLOSED_MARKER: &str = "\n[stream closed]";

#[allow(clippy::expect_used, reason = "Static regex literals are verified by tests")]
static LOOP_ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*-{2,}\s*round\b|task complete").expect("loop artifact regex")
});

pub fn is_loop_artifact(line: &str) -> bool {
    LOOP_ARTIFACT_RE.is_match(line)
}

/// Text of `choices[].delta.content` in an SSE `data:` line.
fn sse_delta_content(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if !payload.starts_with('{') {
        return None;
    }
    let event: Value = serde_json::from_str(payload).ok()?;
    let choices = event.get("choices")?.as_array()?;
    Some(choices.iter().filter_map(|c| c.pointer("/delta/content").and_then(Value::as_str)).collect())
}

/// Raw artifact lines, or SSE events whose delta text is one.
///
/// An artifact split across several deltas is not recognized.
fn is_artifact_line(line: &str) -> bool {
    is_loop_artifact(line) || sse_delta_content(line).is_some_and(|text| text.lines().any(is_loop_artifact))
}

/// Per-response line filter.
///
/// Chunks may split lines anywhere; the incomplete tail is held back until
/// the next chunk or [`StreamGuard::finish`].
#[derive(Debug, Default)]
pub struct StreamGuard {
    line_count: usize,
    truncated: bool,
    seen_content: bool,
    pending: Vec<u8>,
    completion_mode: bool,
}

impl StreamGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard for a whole completion text: no stream-closed marker.
    fn for_completion() -> Self {
        Self { completion_mode: true, ..Self::default() }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Filter one chunk and return the bytes to forward.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        if self.truncated {
            return Bytes::new();
        }
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(self.pending.len());

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            self.accept_line(&line, true, &mut out);
            start = end + 1;
            if self.truncated {
                break;
            }
        }

        if self.truncated {
            self.pending.clear();
        } else {
            self.pending.drain(..start);
        }
        Bytes::from(out)
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Bytes {
        if self.truncated || self.pending.is_empty() {
            self.pending.clear();
            return Bytes::new();
        }
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        let mut out = Vec::new();
        self.accept_line(&line, false, &mut out);
        Bytes::from(out)
    }

    fn accept_line(&mut self, line: &str, newline: bool, out: &mut Vec<u8>) {
        if self.truncated || is_artifact_line(line) {
            return;
        }
        if !self.seen_content && line.trim().is_empty() {
            return;
        }
        self.seen_content = true;

        if self.line_count >= MAX_OUTPUT_LINES {
            self.truncated = true;
            out.extend_from_slice(TRUNCATED_MARKER.as_bytes());
            if !self.completion_mode {
                out.push(b'\n');
                out.extend_from_slice(STREAM_CLOSED_MARKER.as_bytes());
            }
            return;
        }

        self.line_count += 1;
        out.extend_from_slice(line.as_bytes());
        if newline {
            out.push(b'\n');
        }
    }
}

/// Apply the guard rules to a complete text in one pass.
pub fn sanitize_text(text: &str) -> String {
    let mut guard = StreamGuard::for_completion();
    let mut out = guard.push(text.as_bytes()).to_vec();
    out.extend_from_slice(&guard.finish());
    String::from_utf8_lossy(&out).into_owned()
}

/// Sanitize every `choices[].message.content` string of a completion body.
pub fn sanitize_completion(body: &mut Value) {
    let Some(choices) = body.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };
    for choice in choices {
        if let Some(content) = choice.pointer_mut("/message/content") {
            if let Some(cleaned) = content.as_str().map(sanitize_text) {
                *content = Value::String(cleaned);
            }
        }
    }
}
