//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; events are dispatched on blank lines.
//! Comment lines (`:`) and `id`/`retry` fields are ignored.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, `"message"` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// End of stream. An event without its terminating blank line is dropped.
    /// Returns whether one was pending.
    pub fn finish(&mut self) -> bool {
        let pending = !self.buffer.is_empty() || !self.data.is_empty();
        self.buffer.clear();
        self.data.clear();
        self.event = None;
        pending
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
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
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"progr").is_empty());
        let events = decoder.push(b"ess\"}\n\ndata: second\r\n\r\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"type\":\"progress\"}");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\nevent: update\ndata: a\ndata: b\nid: 7\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "update".to_string(),
                data: "a\nb".to_string(),
            }]
        );
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"\n\nevent: ping\n\n").is_empty());
    }

    #[test]
    fn unterminated_event_is_discarded_at_end_of_stream() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: first\n\ndata: last\n").len(), 1);
        assert!(decoder.finish());
        assert!(!decoder.finish());
        assert!(decoder.push(b"\n").is_empty());
    }
}
