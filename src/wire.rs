//! Line-delimited streaming wire format.
//!
//! A response is a sequence of UTF-8 lines, each terminated by `\n`:
//! - log lines: free text for display
//! - exactly one terminal line on success:
//!   `{"type":"result","allocation":{...},"deposits":[...]}`
//!
//! A line is terminal iff it contains `"type":"result"`. A stream that ends
//! without one failed; its last log line is usually `Error: <message>`.

use serde::{Deserialize, Serialize};

use crate::types::{AllocationResult, AllocationSummary};

/// Substring that marks the terminal result line.
pub const RESULT_MARKER: &str = r#""type":"result""#;

/// Prefix of error log lines.
pub const ERROR_PREFIX: &str = "Error: ";

/// The terminal result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub allocation: AllocationResult,
    /// One entry per allocation, in allocation order.
    #[serde(default)]
    pub deposits: Vec<AllocationSummary>,
}

impl TerminalResult {
    pub fn new(allocation: AllocationResult, deposits: Vec<AllocationSummary>) -> Self {
        Self {
            kind: "result".to_string(),
            allocation,
            deposits,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a log message. Embedded newlines are kept; the message is
/// terminated by exactly one `\n`.
pub fn encode_log(message: &str) -> String {
    let mut line = message.trim_end_matches('\n').to_string();
    line.push('\n');
    line
}

/// Encode an error as an `Error: …` log line.
pub fn encode_error(message: &str) -> String {
    encode_log(&format!("{ERROR_PREFIX}{message}"))
}

/// Encode the terminal result as a single compact JSON line.
pub fn encode_result(result: &TerminalResult) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(result)?;
    line.push('\n');
    Ok(line)
}

/// Terminal-line detection rule.
pub fn is_terminal_line(line: &str) -> bool {
    line.contains(RESULT_MARKER)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// What a consumer saw once the stream closed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub logs: Vec<String>,
    pub result: Option<TerminalResult>,
}

impl StreamOutcome {
    /// Successful iff a terminal result line was received.
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }

    /// The last `Error: …` line, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.logs
            .iter()
            .rev()
            .find_map(|l| l.strip_prefix(ERROR_PREFIX))
    }
}

/// Incremental decoder for chunks that may split lines arbitrarily.
#[derive(Debug, Default)]
pub struct StreamReader {
    buffer: String,
    logs: Vec<String>,
    result: Option<TerminalResult>,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of text.
    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.accept(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Feed raw bytes; invalid UTF-8 is replaced.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.push(&String::from_utf8_lossy(chunk));
    }

    fn accept(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if is_terminal_line(line) {
            if let Ok(result) = serde_json::from_str::<TerminalResult>(line) {
                self.result = Some(result);
                return;
            }
        }
        self.logs.push(line.to_string());
    }

    /// Close the stream, flushing any unterminated final line.
    pub fn finish(mut self) -> StreamOutcome {
        let rest = std::mem::take(&mut self.buffer);
        self.accept(rest.trim_end_matches('\r'));
        StreamOutcome {
            logs: self.logs,
            result: self.result,
        }
    }
}

/// Decode a complete response body.
pub fn decode(body: &str) -> StreamOutcome {
    let mut reader = StreamReader::new();
    reader.push(body);
    reader.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
