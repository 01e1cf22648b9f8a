use editpilot_core::{ChatMessage, LlmResponse};

/// Message history for one turn. Messages are only ever appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    /// Most recent model response; not part of the emitted history.
    last_response: Option<LlmResponse>,
}

impl Conversation {
    /// Start a turn from the host's history, prefixed with `system_prompt`
    /// unless the history already opens with a system message.
    pub fn from_history(system_prompt: &str, history: Vec<ChatMessage>) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !matches!(history.first(), Some(ChatMessage::System { .. })) {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.extend(history);
        Self {
            messages,
            last_response: None,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Content of the most recent user message, scanning backward.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Record a model response and append it as an assistant message.
    pub fn record_response(&mut self, response: LlmResponse) {
        self.messages.push(ChatMessage::assistant(
            response.text.clone(),
            response.tool_calls.clone(),
        ));
        self.last_response = Some(response);
    }

    pub fn last_response(&self) -> Option<&LlmResponse> {
        self.last_response.as_ref()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}
