//! Wire decoding
//!
//! Both backends frame their output as `data:`-prefixed JSON records separated
//! by newlines, ending with a `data: [DONE]` record. Bytes arrive in arbitrary
//! chunks, so the decoder keeps the unterminated tail of the last line until
//! the next chunk (or the end of the body) completes it.

/// Marker that precedes every record on the wire.
pub const DATA_MARKER: &str = "data:";

/// Record that ends the logical payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of decoding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Incremental text
    Fragment(String),
    /// The `[DONE]` sentinel
    Done,
    /// Valid JSON that carries no text
    Empty,
    /// Not JSON; the record is skipped
    Malformed { record: String, reason: String },
}

/// Incremental record splitter.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of body bytes and decode every record it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        self.pending.extend_from_slice(bytes);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        self.decode_lines(&complete)
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Decoded> {
        let rest = std::mem::take(&mut self.pending);
        self.decode_lines(&rest)
    }

    fn decode_lines(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        let text = String::from_utf8_lossy(bytes);
        let mut out = Vec::new();

        for line in text.split('\n') {
            for record in split_records(line) {
                if self.done {
                    continue;
                }
                let decoded = decode_record(record);
                if decoded == Decoded::Done {
                    self.done = true;
                }
                out.push(decoded);
            }
        }

        out
    }
}

/// Split one line into records at `data:` markers, dropping blank pieces.
///
/// A marker only starts a record at the beginning of the line or directly
/// after the closing brace of a previous record, so `data:` inside a JSON
/// string does not split it.
fn split_records(line: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut rest = line.trim();

    while let Some(stripped) = rest.strip_prefix(DATA_MARKER) {
        rest = stripped.trim_start();
    }

    loop {
        match find_glued_marker(rest) {
            Some(pos) => {
                records.push(&rest[..pos]);
                rest = rest[pos + DATA_MARKER.len()..].trim_start();
            }
            None => {
                records.push(rest);
                break;
            }
        }
    }

    records
        .into_iter()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect()
}

/// Position of a `data:` marker that directly follows a complete top-level
/// JSON object. Brackets and quotes are tracked so that text inside a string
/// value never counts.
fn find_glued_marker(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut object_closed = false;

    for (pos, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                object_closed = false;
            }
            '{' | '[' => {
                depth += 1;
                object_closed = false;
            }
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                object_closed = depth == 0 && ch == '}';
            }
            c if c.is_whitespace() => {}
            _ => {
                if object_closed && s[pos..].starts_with(DATA_MARKER) {
                    return Some(pos);
                }
                object_closed = false;
            }
        }
    }
    None
}

fn decode_record(record: &str) -> Decoded {
    if record == DONE_SENTINEL {
        return Decoded::Done;
    }

    match serde_json::from_str::<serde_json::Value>(record) {
        Ok(value) => match extract_text(&value) {
            Some(text) => Decoded::Fragment(text.to_string()),
            None => Decoded::Empty,
        },
        Err(e) => Decoded::Malformed {
            record: record.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Pull the incremental text out of one decoded record.
///
/// Chat-style records carry `choices[0].delta.content`; completion-style
/// records carry `choices[0].text`. Empty strings count as absent.
pub fn extract_text(value: &serde_json::Value) -> Option<&str> {
    let choice = value.get("choices")?.get(0)?;

    let delta = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty());

    delta.or_else(|| {
        choice
            .get("text")
            .and_then(|t| t.as_str())
            .filter(|s| !s.is_empty())
    })
}
