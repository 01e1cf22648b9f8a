//! Line formats exchanged with the editor extension.
//!
//! Input: one line holding a JSON array of `{role, content}` turns.
//! Output: one line holding `{"messages": [{"type", "content", ...}]}`.
//!
//! An emitted state line is itself accepted as input, so a history survives
//! a full serialize/reconstruct cycle with roles, content and tool-call
//! correlation ids intact.

use crate::{ChatMessage, LlmToolCall, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid turn payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("tool message at index {index} has no tool_call_id")]
    MissingToolCallId { index: usize },
}

/// One message as it appears on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type", alias = "role")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<LlmToolCall>,
}

/// A prior turn sent by the host. Same shape as an emitted message.
pub type HostTurn = WireMessage;

impl WireMessage {
    pub fn from_chat(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role(),
            content: msg.content().to_string(),
            tool_call_id: msg.tool_call_id().map(ToString::to_string),
            tool_calls: msg.tool_calls().to_vec(),
        }
    }

    fn into_chat(self, index: usize) -> Result<ChatMessage, WireError> {
        Ok(match self.role {
            Role::System => ChatMessage::system(self.content),
            Role::User => ChatMessage::user(self.content),
            Role::Assistant => ChatMessage::assistant(self.content, self.tool_calls),
            Role::Tool => {
                let id = self
                    .tool_call_id
                    .ok_or(WireError::MissingToolCallId { index })?;
                ChatMessage::tool(id, self.content)
            }
        })
    }
}

/// The full conversation emitted at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireState {
    pub messages: Vec<WireMessage>,
}

impl WireState {
    pub fn from_history(history: &[ChatMessage]) -> Self {
        Self {
            messages: history.iter().map(WireMessage::from_chat).collect(),
        }
    }

    pub fn into_history(self) -> Result<Vec<ChatMessage>, WireError> {
        self.messages
            .into_iter()
            .enumerate()
            .map(|(index, msg)| msg.into_chat(index))
            .collect()
    }

    pub fn to_line(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TurnPayload {
    Turns(Vec<HostTurn>),
    State(WireState),
}

/// Parse one host input line into conversation messages.
///
/// Accepts the host's plain turn array as well as a previously emitted
/// `{"messages": [...]}` state.
pub fn parse_turns(line: &str) -> Result<Vec<ChatMessage>, WireError> {
    let turns = match serde_json::from_str::<TurnPayload>(line.trim()) {
        Ok(TurnPayload::Turns(turns)) => turns,
        Ok(TurnPayload::State(state)) => state.messages,
        // Re-parse as the primary shape so the error points at the array.
        Err(_) => serde_json::from_str::<Vec<HostTurn>>(line.trim())?,
    };
    WireState { messages: turns }.into_history()
}
