//! Direct edits recognized in the user's own words.
//!
//! When the model answers without calling a tool, the latest user message
//! is checked for one of three explicit instruction shapes:
//!
//! - ``replace lines 3-5 in src/lib.rs with ```...``` ``
//! - ``insert at cursor in src/lib.rs ```...``` ``
//! - ``search/replace in src/lib.rs pattern /foo/ -> ```...``` ``
//!
//! Matching is case-insensitive and the code block may span lines, with an
//! optional language tag after the opening fence.

use crate::conversation::Conversation;
use crate::dispatch::{CallRecord, execute_call};
use editpilot_core::{ChatMessage, LlmToolCall};
use editpilot_observe::Observer;
use editpilot_tools::ToolRegistry;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditIntent {
    /// Replace whole lines. Lines are 0-based and `end_line` is exclusive, so
    /// the range ends at character 0 of the line after the last one replaced.
    ReplaceLines {
        path: String,
        start_line: u32,
        end_line: u32,
        text: String,
    },
    /// Insert at (0, 0); the host treats that as the active cursor when the
    /// file is open.
    InsertAtCursor { path: String, text: String },
    SearchReplace {
        path: String,
        pattern: String,
        replacement: String,
    },
}

impl EditIntent {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::ReplaceLines { .. } => "replace_text",
            Self::InsertAtCursor { .. } => "insert_text",
            Self::SearchReplace { .. } => "search_and_replace",
        }
    }

    pub fn arguments(&self) -> Value {
        match self {
            Self::ReplaceLines {
                path,
                start_line,
                end_line,
                text,
            } => json!({
                "filePath": path,
                "startLine": start_line,
                "startChar": 0,
                "endLine": end_line,
                "endChar": 0,
                "newText": text,
            }),
            Self::InsertAtCursor { path, text } => json!({
                "filePath": path,
                "lineNumber": 0,
                "charNumber": 0,
                "text": text,
            }),
            Self::SearchReplace {
                path,
                pattern,
                replacement,
            } => json!({
                "filePath": path,
                "searchRegex": pattern,
                "replaceText": replacement,
            }),
        }
    }

    /// The intent as a tool call with a fresh correlation id.
    pub fn to_tool_call(&self) -> LlmToolCall {
        LlmToolCall {
            id: format!("smart_edit_{}", uuid::Uuid::now_v7().simple()),
            name: self.tool_name().to_string(),
            arguments: self.arguments().to_string(),
        }
    }
}

struct EditPatterns {
    replace: Regex,
    insert: Regex,
    search_replace: Regex,
}

const FENCED: &str = r"```(?:[\w+#.-]*[ \t]*\n)?(.*?)```";
const PATH: &str = r"`?([^\s`]+)`?";

fn patterns() -> Option<&'static EditPatterns> {
    static PATTERNS: OnceLock<Option<EditPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(EditPatterns {
                replace: Regex::new(&format!(
                    r"(?is)\breplace\s+lines?\s+(\d+)(?:\s*-\s*(\d+))?\s+in\s+{PATH}\s+with\s*{FENCED}"
                ))
                .ok()?,
                insert: Regex::new(&format!(
                    r"(?is)\binsert\s+(?:text\s+)?at\s+(?:the\s+)?cursor\s+in\s+{PATH}\s*{FENCED}"
                ))
                .ok()?,
                search_replace: Regex::new(&format!(
                    r"(?is)\bsearch\s*/\s*replace\s+in\s+{PATH}\s+pattern\s+/(.+?)/\s*->\s*{FENCED}"
                ))
                .ok()?,
            })
        })
        .as_ref()
}

/// Recognize an explicit edit instruction in `text`.
pub fn parse_edit_intent(text: &str) -> Option<EditIntent> {
    let patterns = patterns()?;

    if let Some(caps) = patterns.replace.captures(text) {
        let start: u32 = caps.get(1)?.as_str().parse().ok()?;
        let end: u32 = match caps.get(2) {
            Some(m) => m.as_str().parse().ok()?,
            None => start,
        };
        let (start_line, end_line) = line_range(start, end)?;
        return Some(EditIntent::ReplaceLines {
            path: caps.get(3)?.as_str().to_string(),
            start_line,
            end_line,
            text: block_text(caps.get(4)?.as_str()),
        });
    }

    if let Some(caps) = patterns.insert.captures(text) {
        return Some(EditIntent::InsertAtCursor {
            path: caps.get(1)?.as_str().to_string(),
            text: block_text(caps.get(2)?.as_str()),
        });
    }

    if let Some(caps) = patterns.search_replace.captures(text) {
        return Some(EditIntent::SearchReplace {
            path: caps.get(1)?.as_str().to_string(),
            pattern: caps.get(2)?.as_str().to_string(),
            replacement: block_text(caps.get(3)?.as_str()),
        });
    }

    None
}

/// 1-based inclusive `start..=end` to 0-based, end-exclusive line bounds.
fn line_range(start: u32, end: u32) -> Option<(u32, u32)> {
    if start == 0 || end < start {
        return None;
    }
    Some((start - 1, end))
}

fn block_text(raw: &str) -> String {
    raw.strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(raw)
        .to_string()
}

/// Run the fallback against the conversation.
///
/// On a match, appends an assistant message carrying the synthesized call
/// followed by its result, and returns the call record.
pub fn smart_edit_step(
    conversation: &mut Conversation,
    registry: &ToolRegistry,
    observer: &Observer,
) -> Option<CallRecord> {
    let intent = conversation.latest_user_message().and_then(parse_edit_intent)?;
    let call = intent.to_tool_call();
    tracing::info!(tool = %call.name, "applying edit from user instruction");
    let (result, record) = execute_call(registry, observer, &call);
    conversation.push(ChatMessage::assistant(String::new(), vec![call]));
    conversation.push(result);
    Some(record)
}
