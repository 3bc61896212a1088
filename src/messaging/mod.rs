//! Parent-process channel
//!
//! The parent pipeline reads the trainer's stdout line by line and parses
//! each line as JSON. Free text is sent as `{"type":"console.log","text":...}`
//! and structured results under their own `type`.

use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Write};

/// Message type the parent prints verbatim
pub const CONSOLE_LOG: &str = "console.log";

/// Line-oriented JSON writer towards the parent process
pub struct ParentChannel<W: Write> {
    writer: W,
}

impl ParentChannel<io::Stdout> {
    /// Channel on the process' stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ParentChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Send free text
    pub fn print(&mut self, text: impl AsRef<str>) {
        self.send(CONSOLE_LOG, Value::String(text.as_ref().to_string()));
    }

    /// Send any serializable value as console output
    pub fn print_value<T: Serialize + ?Sized>(&mut self, value: &T) {
        self.message(CONSOLE_LOG, value);
    }

    /// Send a structured message of the given type
    pub fn message<T: Serialize + ?Sized>(&mut self, kind: &str, value: &T) {
        let text = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, kind, "Unserializable parent message");
                return;
            }
        };
        self.send(kind, text);
    }

    fn send(&mut self, kind: &str, text: Value) {
        let line = json!({ "type": kind, "text": text });
        let result = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "Parent channel write failed");
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Parse the lines a channel wrote into a buffer (used by tests and tooling)
pub fn decode_lines(buffer: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(buffer)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_print_is_console_log() {
        let mut channel = ParentChannel::new(Vec::new());
        channel.print("hello parent");

        let lines = decode_lines(channel.get_ref());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], "console.log");
        assert_eq!(lines[0]["text"], "hello parent");
    }

    #[test]
    fn test_structured_message() {
        let mut channel = ParentChannel::new(Vec::new());
        let mut params = BTreeMap::new();
        params.insert("max_depth", 3);
        channel.message("trainingResults", &params);
        channel.print_value(&0.75);

        let lines = decode_lines(&channel.into_inner());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "trainingResults");
        assert_eq!(lines[0]["text"]["max_depth"], 3);
        assert_eq!(lines[1]["text"], 0.75);
    }

    #[test]
    fn test_one_line_per_message() {
        let mut channel = ParentChannel::new(Vec::new());
        channel.print("multi\nline");
        let raw = String::from_utf8(channel.into_inner()).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }
}
