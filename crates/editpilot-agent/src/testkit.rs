//! Scripted collaborators shared by the agent tests.

use anyhow::{Result, anyhow};
use editpilot_channel::{ChannelError, Command, CommandChannel};
use editpilot_core::{ChatRequest, LlmResponse, LlmToolCall};
use editpilot_llm::LlmClient;
use editpilot_observe::Observer;
use editpilot_tools::ToolRegistry;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<LlmResponse>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete_chat(&self, req: &ChatRequest) -> Result<LlmResponse> {
        self.requests.lock().expect("requests").push(req.clone());
        self.responses
            .lock()
            .expect("responses")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no more scripted responses")))
    }
}

pub struct RecordingChannel {
    pub sent: Mutex<Vec<Command>>,
    replies: Mutex<VecDeque<Result<String, ChannelError>>>,
}

impl RecordingChannel {
    pub fn replying(replies: Vec<Result<String, ChannelError>>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
        })
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().expect("sent").clone()
    }
}

impl CommandChannel for RecordingChannel {
    fn round_trip(&self, command: &Command) -> Result<String, ChannelError> {
        self.sent.lock().expect("sent").push(command.clone());
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .unwrap_or(Ok("ok".to_string()))
    }
}

#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buf").extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().expect("buf").clone()).expect("utf8")
    }
}

pub fn registry(channel: Arc<RecordingChannel>) -> ToolRegistry {
    ToolRegistry::new(Some(PathBuf::from("/ws")), channel)
}

pub fn observer() -> (Observer, SharedBuf) {
    let buf = SharedBuf::default();
    (Observer::with_writer(Box::new(buf.clone())), buf)
}

pub fn call(id: &str, name: &str, arguments: &str) -> LlmToolCall {
    LlmToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse::text(text)
}

pub fn tool_response(tool_calls: Vec<LlmToolCall>) -> LlmResponse {
    LlmResponse {
        text: String::new(),
        finish_reason: "tool_calls".to_string(),
        tool_calls,
    }
}
