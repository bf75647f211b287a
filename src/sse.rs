//! Incremental decoder for `text/event-stream` framing.
//!
//! Network chunks arrive with arbitrary boundaries: a chunk may end mid-line,
//! mid-field, or even mid-UTF-8-sequence. [`SseDecoder`] accumulates chunks,
//! extracts complete lines, and assembles them into [`Frame`]s per the
//! line-oriented event-stream rules:
//!
//! - lines are delimited by `\n`; a trailing `\r` is stripped
//! - an empty line emits the pending frame
//! - `:`-prefixed lines are comments and ignored
//! - `event:` / `id:` replace the pending values, `data:` lines accumulate
//!   and are joined with `\n`; unknown fields (e.g. `retry`) are ignored

use tracing::warn;

/// One decoded unit of event-stream framing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Event name from the last `event:` field line, if any.
    pub event: Option<String>,
    /// Identifier from the last `id:` field line, if any.
    pub id: Option<String>,
    /// All `data:` lines joined with `\n`, in arrival order.
    pub data: Option<String>,
}

/// Streaming frame decoder fed one byte chunk at a time.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Undecoded UTF-8 tail carried over when a chunk splits a character.
    tail: Vec<u8>,
    /// Decoded text not yet split into complete lines.
    buffer: String,
    /// Pending `event:` value for the frame under assembly.
    event: Option<String>,
    /// Pending `id:` value for the frame under assembly.
    id: Option<String>,
    /// Pending `data:` lines for the frame under assembly.
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode_text(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].to_string();
            self.buffer.drain(..=newline);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.apply_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Signal end of stream, flushing a final frame that never received its
    /// terminating blank line. Returns `None` when nothing is pending.
    pub fn finish(&mut self) -> Option<Frame> {
        // A partial last line without a trailing newline still counts.
        if !self.tail.is_empty() {
            let tail = std::mem::take(&mut self.tail);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.apply_line(line) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    /// Decode `chunk` as UTF-8 into the text buffer, holding back an
    /// incomplete trailing sequence for the next chunk.
    fn decode_text(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.tail);
        bytes.extend_from_slice(chunk);

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, invalid) = rest.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is well-formed.
                    self.buffer.push_str(std::str::from_utf8(valid).unwrap_or(""));
                    match err.error_len() {
                        // A sequence split across chunks: keep it for later.
                        None => {
                            self.tail = invalid.to_vec();
                            return;
                        }
                        // Genuinely invalid bytes: degrade, don't fail the stream.
                        Some(len) => {
                            warn!(bytes = len, "replacing invalid UTF-8 in event stream");
                            self.buffer.push('\u{FFFD}');
                            rest = &invalid[len..];
                        }
                    }
                }
            }
        }
    }

    /// Process one complete line; returns a frame when the line terminates one.
    fn apply_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            // `retry` and any future fields are ignored.
            _ => {}
        }
        None
    }

    /// Emit the pending frame, unless the accumulation is entirely empty.
    fn take_frame(&mut self) -> Option<Frame> {
        if self.event.is_none() && self.id.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let data_lines = std::mem::take(&mut self.data_lines);
        Some(Frame {
            event: self.event.take(),
            id: self.id.take(),
            data: if data_lines.is_empty() {
                None
            } else {
                Some(data_lines.join("\n"))
            },
        })
    }
}
