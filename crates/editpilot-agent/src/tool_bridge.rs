//! Formats tool outcomes as conversation messages for the next model call.

use editpilot_core::ChatMessage;

/// Maximum bytes of tool output before truncation.
pub const MAX_TOOL_OUTPUT_BYTES: usize = 25_000;

/// Convert successful tool output into a `ChatMessage::Tool`.
///
/// Truncates large outputs to `MAX_TOOL_OUTPUT_BYTES` to keep the context small.
pub fn tool_result_to_message(tool_call_id: &str, output: &str) -> ChatMessage {
    ChatMessage::tool(tool_call_id, truncate_output(output, MAX_TOOL_OUTPUT_BYTES))
}

/// Format a tool error as a `ChatMessage::Tool` with error content.
pub fn tool_error_to_message(tool_call_id: &str, error: &str) -> ChatMessage {
    ChatMessage::tool(tool_call_id, format!("Error: {error}"))
}

/// Short assistant note appended after a successful call.
pub fn acknowledgment(tool_name: &str) -> ChatMessage {
    ChatMessage::assistant(format!("Executed `{tool_name}` successfully."), Vec::new())
}

/// Truncate output to `max_bytes` on a char boundary, appending a notice.
fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    // Find a safe UTF-8 boundary
    let boundary = text
        .char_indices()
        .take_while(|(i, _)| *i < max_bytes.saturating_sub(80))
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let truncated = &text[..boundary];
    format!(
        "{truncated}\n\n[Output truncated: showing {boundary}/{} bytes. Narrow the path or query to reduce output size.]",
        text.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_keeps_output_and_correlation_id() {
        let msg = tool_result_to_message("call_1", "file contents here");
        assert_eq!(msg, ChatMessage::tool("call_1", "file contents here"));
    }

    #[test]
    fn error_is_prefixed() {
        let msg = tool_error_to_message("call_2", "file not found");
        assert_eq!(msg.content(), "Error: file not found");
        assert_eq!(msg.tool_call_id(), Some("call_2"));
    }

    #[test]
    fn truncate_large_tool_output() {
        let big = "x".repeat(30_000);
        let msg = tool_result_to_message("call_3", &big);
        let content = msg.content();
        assert!(content.len() < 26_000);
        assert!(content.contains("[Output truncated"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let wide = "é".repeat(20_000);
        let out = truncate_output(&wide, MAX_TOOL_OUTPUT_BYTES);
        assert!(out.starts_with('é'));
        assert!(out.contains("/40000 bytes"));
    }

    #[test]
    fn acknowledgment_names_the_tool() {
        let msg = acknowledgment("create_file");
        assert_eq!(msg.content(), "Executed `create_file` successfully.");
        assert!(msg.tool_calls().is_empty());
    }
}
