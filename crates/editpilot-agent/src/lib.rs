pub mod conversation;
pub mod dispatch;
pub mod graph;
pub mod smart_edit;
pub mod tool_bridge;

#[cfg(test)]
mod testkit;

pub use conversation::Conversation;
pub use dispatch::{CallRecord, dispatch_tool_calls};
pub use graph::{Graph, GraphError, Node, Outcome};
pub use smart_edit::{EditIntent, parse_edit_intent};

use anyhow::Result;
use editpilot_core::{AppConfig, ChatMessage, ChatRequest, ToolChoice};
use editpilot_llm::LlmClient;
use editpilot_observe::Observer;
use editpilot_tools::{ToolRegistry, tool_definitions};

/// Default maximum number of model calls per turn.
pub const DEFAULT_MAX_TURNS: usize = 50;

/// Appended when a turn is cut short by the iteration bound.
pub const MAX_TURNS_NOTICE: &str =
    "Stopped after reaching the maximum number of steps for this turn. Ask me to continue if more work is needed.";

/// Configuration for the control loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub max_turns: usize,
    /// Append a short assistant note after each successful tool call.
    pub acknowledge_tool_results: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: None,
            max_turns: DEFAULT_MAX_TURNS,
            acknowledge_tool_results: true,
        }
    }
}

impl LoopConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            max_tokens: cfg.llm.max_tokens,
            temperature: Some(cfg.llm.temperature),
            max_turns: cfg.agent.max_turns,
            acknowledge_tool_results: cfg.agent.acknowledge_tool_results,
        }
    }
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFinish {
    /// The graph reached End.
    Completed,
    /// The iteration bound was hit before the model stopped.
    MaxTurns,
}

/// Result of running one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Full history, including the messages appended this turn.
    pub messages: Vec<ChatMessage>,
    /// Tool calls executed, in order, including a smart-edit call.
    pub tool_calls_made: Vec<CallRecord>,
    /// Number of model calls made.
    pub llm_calls: usize,
    pub smart_edit_applied: bool,
    pub finish: TurnFinish,
}

/// Drives one turn through the graph.
pub struct ControlLoop<'a> {
    llm: &'a dyn LlmClient,
    registry: &'a ToolRegistry,
    observer: &'a Observer,
    graph: Graph,
    config: LoopConfig,
}

impl<'a> ControlLoop<'a> {
    /// Build a loop over `graph`, rejecting tables with missing transitions.
    pub fn new(
        llm: &'a dyn LlmClient,
        registry: &'a ToolRegistry,
        observer: &'a Observer,
        graph: Graph,
        config: LoopConfig,
    ) -> Result<Self, GraphError> {
        graph.validate()?;
        Ok(Self {
            llm,
            registry,
            observer,
            graph,
            config,
        })
    }

    /// Run until the graph reaches End or the iteration bound is hit.
    ///
    /// Tool failures are recorded in the history. Only a failed model call
    /// aborts the turn.
    pub fn run(&self, mut conversation: Conversation) -> Result<TurnReport> {
        let mut node = self.graph.entry();
        let mut llm_calls = 0usize;
        let mut tool_calls_made = Vec::new();
        let mut smart_edit_attempted = false;
        let mut smart_edit_applied = false;
        let mut tools_dispatched = false;
        let mut finish = TurnFinish::Completed;

        loop {
            let outcome = match node {
                Node::End => break,
                Node::Agent => {
                    if llm_calls >= self.config.max_turns {
                        tracing::warn!(llm_calls, "max turns reached");
                        conversation.push(ChatMessage::assistant(MAX_TURNS_NOTICE, Vec::new()));
                        finish = TurnFinish::MaxTurns;
                        break;
                    }
                    llm_calls += 1;
                    self.agent_step(&mut conversation)?
                }
                Node::Tools => {
                    let calls = conversation
                        .last_response()
                        .map(|r| r.tool_calls.clone())
                        .unwrap_or_default();
                    let (messages, records) = dispatch_tool_calls(
                        self.registry,
                        self.observer,
                        &calls,
                        self.config.acknowledge_tool_results,
                    );
                    tools_dispatched |= !records.is_empty();
                    conversation.extend(messages);
                    tool_calls_made.extend(records);
                    Outcome::Dispatched
                }
                Node::SmartEdit => {
                    // Only for a turn in which no tool has run.
                    if smart_edit_attempted || tools_dispatched {
                        Outcome::NothingRecognized
                    } else {
                        smart_edit_attempted = true;
                        match smart_edit::smart_edit_step(
                            &mut conversation,
                            self.registry,
                            self.observer,
                        ) {
                            Some(record) => {
                                smart_edit_applied = true;
                                tool_calls_made.push(record);
                                Outcome::EditApplied
                            }
                            None => Outcome::NothingRecognized,
                        }
                    }
                }
            };
            let next = self.graph.next(node, outcome)?;
            tracing::debug!(?node, ?outcome, ?next, "step");
            node = next;
        }

        Ok(TurnReport {
            messages: conversation.into_messages(),
            tool_calls_made,
            llm_calls,
            smart_edit_applied,
            finish,
        })
    }

    fn agent_step(&self, conversation: &mut Conversation) -> Result<Outcome> {
        let request = self.build_request(conversation);
        let mut response = self.llm.complete_chat(&request)?;
        if request.tools.is_empty() && !response.tool_calls.is_empty() {
            tracing::warn!(
                tool_calls = response.tool_calls.len(),
                "dropping tool calls the model made without being offered tools"
            );
            response.tool_calls.clear();
        }
        let outcome = if response.tool_calls.is_empty() {
            Outcome::NoToolCalls
        } else {
            Outcome::ToolCallsRequested
        };
        tracing::debug!(
            tool_calls = response.tool_calls.len(),
            finish_reason = %response.finish_reason,
            "model responded"
        );
        conversation.record_response(response);
        Ok(outcome)
    }

    fn build_request(&self, conversation: &Conversation) -> ChatRequest {
        let tools = if self.graph.offers_tools() {
            tool_definitions()
        } else {
            Vec::new()
        };
        ChatRequest {
            model: self.config.model.clone(),
            messages: conversation.messages().to_vec(),
            tools,
            tool_choice: ToolChoice::auto(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}
