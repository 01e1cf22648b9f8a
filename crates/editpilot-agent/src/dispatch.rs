use crate::tool_bridge::{acknowledgment, tool_error_to_message, tool_result_to_message};
use editpilot_core::{ChatMessage, LlmToolCall};
use editpilot_observe::Observer;
use editpilot_tools::ToolRegistry;

/// Result of running one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub success: bool,
}

/// Run a single tool call and format its outcome.
///
/// Failures become an `Error: ...` tool message; they never propagate.
pub fn execute_call(
    registry: &ToolRegistry,
    observer: &Observer,
    call: &LlmToolCall,
) -> (ChatMessage, CallRecord) {
    let (message, success) = match registry.execute(&call.name, &call.arguments) {
        Ok(output) => {
            observer.tool_success(&call.name);
            (tool_result_to_message(&call.id, &output), true)
        }
        Err(e) => {
            let description = e.to_string();
            observer.tool_error(&description);
            (tool_error_to_message(&call.id, &description), false)
        }
    };
    let record = CallRecord {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        success,
    };
    (message, record)
}

/// Run every call in order, one result message per call.
///
/// With `acknowledge` set, each successful result is followed by a short
/// assistant note.
pub fn dispatch_tool_calls(
    registry: &ToolRegistry,
    observer: &Observer,
    calls: &[LlmToolCall],
    acknowledge: bool,
) -> (Vec<ChatMessage>, Vec<CallRecord>) {
    let mut messages = Vec::with_capacity(calls.len() * 2);
    let mut records = Vec::with_capacity(calls.len());
    for call in calls {
        let (message, record) = execute_call(registry, observer, call);
        tracing::debug!(
            tool = %record.tool_name,
            id = %record.tool_call_id,
            success = record.success,
            "tool call finished"
        );
        messages.push(message);
        if acknowledge && record.success {
            messages.push(acknowledgment(&record.tool_name));
        }
        records.push(record);
    }
    (messages, records)
}
