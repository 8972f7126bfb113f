/// Incremental SSE (Server-Sent Events) parser for the streaming chat
/// endpoint.
///
/// Events are blocks separated by a blank line, each containing optional
/// `event:` and one or more `data:` lines. Chunks arriving off the network
/// can split an event anywhere, so incomplete input is buffered until the
/// closing boundary shows up.

/// A single parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

pub struct SseParser {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence, held until the next
    /// chunk completes them.
    pending: Vec<u8>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    /// Feed raw bytes from the HTTP response; returns every event completed
    /// by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.decode(chunk);
        // Normalize CRLF so boundary detection only deals with "\n\n".
        // Done over the whole buffer so a "\r\n" split across chunks is
        // still caught once both halves have arrived.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let rest = self.buffer.split_off(boundary + 2);
            let block = std::mem::replace(&mut self.buffer, rest);

            if let Some(event) = parse_block(block.trim_end_matches('\n')) {
                events.push(event);
            }
        }
        events
    }

    /// Appends decoded text to the buffer. Chunks can split a multibyte
    /// character anywhere, so only complete UTF-8 sequences are decoded;
    /// a trailing partial sequence waits for the next chunk.
    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let text = String::from_utf8_lossy(&self.pending[..valid]);
                    self.buffer.push_str(&text);
                    match e.error_len() {
                        // Genuinely invalid bytes: replace and keep going.
                        Some(bad) => {
                            self.buffer.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete tail: hold it for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            // Comment / keep-alive line.
            continue;
        }
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
        }
        // id: and retry: fields are irrelevant here.
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
    })
}
