//! Command Channel between the worker and the editor host.
//!
//! The worker writes one [`Command`] per line to stdout. The host answers
//! with zero or more lines that concatenate to a JSON object, followed by a
//! line holding exactly [`END_OF_TOOL_OUTPUT`].

mod lines;

pub use lines::{HostLines, HostWriter};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Terminates every host response.
pub const END_OF_TOOL_OUTPUT: &str = "END_OF_TOOL_OUTPUT";

const NO_OUTPUT: &str = "No output returned.";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("host sent no response lines before END_OF_TOOL_OUTPUT")]
    NoResponse,
    #[error("malformed host response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Host(String),
    #[error("timed out waiting for the host response")]
    Timeout,
    #[error("host closed the channel before responding")]
    Closed,
    #[error("channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A request for the host to perform an editor or filesystem operation.
/// Paths are absolute by the time a command is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    ReadFile {
        path: String,
    },
    CreateFile {
        path: String,
        content: String,
    },
    ListFiles {
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    ReplaceText {
        file_path: String,
        start_line: u32,
        start_char: u32,
        end_line: u32,
        end_char: u32,
        new_text: String,
    },
    #[serde(rename_all = "camelCase")]
    InsertText {
        file_path: String,
        line_number: u32,
        char_number: u32,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SearchAndReplace {
        file_path: String,
        search_regex: String,
        replace_text: String,
    },
    SemanticSearch {
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    RegexSearch {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "readFile",
            Self::CreateFile { .. } => "createFile",
            Self::ListFiles { .. } => "listFiles",
            Self::ReplaceText { .. } => "replaceText",
            Self::InsertText { .. } => "insertText",
            Self::SearchAndReplace { .. } => "searchAndReplace",
            Self::SemanticSearch { .. } => "semanticSearch",
            Self::RegexSearch { .. } => "regexSearch",
        }
    }

    pub fn to_line(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Malformed(e.to_string()))
    }
}

/// One request/response transaction with the host.
pub trait CommandChannel: Send + Sync {
    /// Send `command` and block until its response arrives. Returns the
    /// host's `tool_output` rendered as text.
    fn round_trip(&self, command: &Command) -> Result<String, ChannelError>;
}

/// Interpret the lines the host sent before the sentinel.
///
/// Lines are trimmed and concatenated, so a pretty-printed payload split
/// across lines parses the same as a compact one.
pub fn parse_response(lines: &[String]) -> Result<String, ChannelError> {
    if lines.is_empty() {
        return Err(ChannelError::NoResponse);
    }
    let joined: String = lines.iter().map(|l| l.trim()).collect();
    let payload: Value =
        serde_json::from_str(&joined).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    let Value::Object(map) = payload else {
        return Err(ChannelError::Malformed(format!(
            "expected a JSON object, got {joined}"
        )));
    };
    if let Some(error) = map.get("error").filter(|v| is_truthy(v)) {
        return Err(ChannelError::Host(value_text(error)));
    }
    Ok(map
        .get("tool_output")
        .map(value_text)
        .unwrap_or_else(|| NO_OUTPUT.to_string()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Command Channel over the worker's own stdio.
#[derive(Debug, Clone)]
pub struct StdioChannel {
    lines: Arc<HostLines>,
    out: HostWriter,
    timeout: Option<Duration>,
}

impl StdioChannel {
    pub fn new(lines: Arc<HostLines>, out: HostWriter, timeout: Option<Duration>) -> Self {
        Self {
            lines,
            out,
            timeout,
        }
    }

    fn read_response(&self) -> Result<Vec<String>, ChannelError> {
        let deadline = lines::deadline_after(self.timeout);
        // A previous command may have timed out; its answer is still queued.
        self.lines.skip_stale(deadline)?;
        let mut collected = Vec::new();
        loop {
            match self.lines.next_line(deadline)? {
                Some(line) if line.trim() == END_OF_TOOL_OUTPUT => return Ok(collected),
                Some(line) => {
                    if !line.trim().is_empty() {
                        collected.push(line);
                    }
                }
                None => return Err(ChannelError::Closed),
            }
        }
    }
}

impl CommandChannel for StdioChannel {
    fn round_trip(&self, command: &Command) -> Result<String, ChannelError> {
        let line = command.to_line()?;
        tracing::debug!(command = command.name(), "sending host command");
        self.out.write_line(&line)?;
        let response = match self.read_response() {
            Ok(lines) => lines,
            Err(ChannelError::Timeout) => {
                self.lines.mark_stale();
                tracing::warn!(command = command.name(), "host response timed out");
                return Err(ChannelError::Timeout);
            }
            Err(e) => return Err(e),
        };
        parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn channel_over(input: &str) -> (StdioChannel, Captured) {
        let captured = Captured::default();
        let channel = StdioChannel::new(
            HostLines::spawn(Cursor::new(input.to_string())),
            HostWriter::new(Box::new(captured.clone())),
            Some(Duration::from_secs(5)),
        );
        (channel, captured)
    }

    fn read(path: &str) -> Command {
        Command::ReadFile {
            path: path.to_string(),
        }
    }

    #[test]
    fn commands_serialize_with_camel_case_fields() {
        let cmd = Command::ReplaceText {
            file_path: "/ws/a.rs".to_string(),
            start_line: 2,
            start_char: 0,
            end_line: 5,
            end_char: 0,
            new_text: "x".to_string(),
        };
        let value: Value = serde_json::from_str(&cmd.to_line().expect("line")).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "command": "replaceText",
                "filePath": "/ws/a.rs",
                "startLine": 2,
                "startChar": 0,
                "endLine": 5,
                "endChar": 0,
                "newText": "x",
            })
        );

        let search = Command::RegexSearch {
            query: "fn main".to_string(),
            file_path: None,
        };
        assert_eq!(
            search.to_line().expect("line"),
            r#"{"command":"regexSearch","query":"fn main"}"#
        );
    }

    #[test]
    fn round_trip_returns_tool_output() {
        let (channel, captured) = channel_over("{\"tool_output\": \"hello\"}\nEND_OF_TOOL_OUTPUT\n");
        let output = channel.round_trip(&read("/ws/a.txt")).expect("round trip");
        assert_eq!(output, "hello");
        let sent = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert_eq!(sent, "{\"command\":\"readFile\",\"path\":\"/ws/a.txt\"}\n");
    }

    #[test]
    fn multi_line_payload_is_concatenated() {
        let (channel, _) =
            channel_over("{\n  \"tool_output\": [\"a.rs\", \"b.rs\"]\n}\nEND_OF_TOOL_OUTPUT\n");
        let output = channel
            .round_trip(&Command::ListFiles {
                path: "/ws".to_string(),
            })
            .expect("round trip");
        assert_eq!(output, r#"["a.rs","b.rs"]"#);
    }

    #[test]
    fn host_error_field_is_an_error() {
        let (channel, _) = channel_over("{\"error\": \"File not found\"}\nEND_OF_TOOL_OUTPUT\n");
        let err = channel.round_trip(&read("/ws/nope")).expect_err("host error");
        assert!(matches!(err, ChannelError::Host(ref msg) if msg == "File not found"));
    }

    #[test]
    fn empty_response_is_distinct_from_host_error() {
        let (channel, _) = channel_over("END_OF_TOOL_OUTPUT\n");
        let err = channel.round_trip(&read("/ws/a")).expect_err("no response");
        assert!(matches!(err, ChannelError::NoResponse));
    }

    #[test]
    fn missing_sentinel_at_eof_is_closed() {
        let (channel, _) = channel_over("{\"tool_output\": \"partial\"}\n");
        let err = channel.round_trip(&read("/ws/a")).expect_err("closed");
        assert!(matches!(err, ChannelError::Closed));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(matches!(
            parse_response(&["[1,2]".to_string()]),
            Err(ChannelError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(&["{oops".to_string()]),
            Err(ChannelError::Malformed(_))
        ));
    }

    #[test]
    fn falsy_error_and_missing_output_fall_back() {
        let out = parse_response(&[r#"{"error": "", "other": 1}"#.to_string()]).expect("ok");
        assert_eq!(out, NO_OUTPUT);
    }

    #[test]
    fn late_response_is_discarded_before_next_command() {
        let (channel, _) = channel_over(
            "{\"tool_output\": \"late\"}\nEND_OF_TOOL_OUTPUT\n{\"tool_output\": \"fresh\"}\nEND_OF_TOOL_OUTPUT\n",
        );
        channel.lines.mark_stale();
        let output = channel.round_trip(&read("/ws/a")).expect("round trip");
        assert_eq!(output, "fresh");
    }

    #[test]
    fn timeout_marks_the_response_stale() {
        let (reader, _writer) = std::io::pipe().expect("pipe");
        let lines = HostLines::spawn(std::io::BufReader::new(reader));
        let channel = StdioChannel::new(
            lines.clone(),
            HostWriter::new(Box::new(Captured::default())),
            Some(Duration::from_millis(20)),
        );
        let err = channel.round_trip(&read("/ws/a")).expect_err("timeout");
        assert!(matches!(err, ChannelError::Timeout));
        assert_eq!(lines.stale_responses(), 1);
    }
}
