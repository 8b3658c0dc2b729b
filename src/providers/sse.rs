//! Server-Sent Events line buffering for streamed completions
//!
//! Network chunks do not line up with SSE lines: one chunk may carry several
//! events, and one event may be split across chunks. The buffer keeps any
//! trailing partial line until the rest of it arrives.

use std::mem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line, prefix stripped
    Data(String),
    /// `data: [DONE]`
    Done,
}

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return every event completed by it.
    ///
    /// Bytes are held until a full line is present, so a multibyte character
    /// split across chunks is decoded intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream has ended
    pub fn flush(&mut self) -> Option<SseEvent> {
        let rest = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();

    // Blank separators, comments, and event:/id:/retry: fields carry no payload
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_string()))
}
