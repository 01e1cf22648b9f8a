//! Control-loop topology as a transition table.
//!
//! Each step reports an [`Outcome`]; the table maps `(node, outcome)` to the
//! next node. Adding a stage or a terminal condition is a table edit.

use editpilot_core::Topology;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Agent,
    Tools,
    SmartEdit,
    End,
}

impl Node {
    /// Outcomes the step at this node can report.
    pub fn outcomes(self) -> &'static [Outcome] {
        match self {
            Self::Agent => &[Outcome::ToolCallsRequested, Outcome::NoToolCalls],
            Self::Tools => &[Outcome::Dispatched],
            Self::SmartEdit => &[Outcome::EditApplied, Outcome::NothingRecognized],
            Self::End => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    ToolCallsRequested,
    NoToolCalls,
    Dispatched,
    EditApplied,
    NothingRecognized,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("no transition from {node:?} on {outcome:?}")]
    MissingTransition { node: Node, outcome: Outcome },
    #[error("entry node {0:?} is terminal")]
    TerminalEntry(Node),
    #[error("End is not reachable from {0:?}")]
    EndUnreachable(Node),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    entry: Node,
    transitions: BTreeMap<(Node, Outcome), Node>,
}

impl Graph {
    pub fn new(entry: Node) -> Self {
        Self {
            entry,
            transitions: BTreeMap::new(),
        }
    }

    pub fn with_edge(mut self, from: Node, on: Outcome, to: Node) -> Self {
        self.transitions.insert((from, on), to);
        self
    }

    /// AGENT → END. Tool calls are not offered; any the model emits anyway
    /// are dropped before the outcome is decided.
    pub fn chat_only() -> Self {
        Self::new(Node::Agent)
            .with_edge(Node::Agent, Outcome::NoToolCalls, Node::End)
            .with_edge(Node::Agent, Outcome::ToolCallsRequested, Node::End)
    }

    /// AGENT → TOOLS → AGENT until the model stops asking for tools.
    pub fn with_tools() -> Self {
        Self::new(Node::Agent)
            .with_edge(Node::Agent, Outcome::ToolCallsRequested, Node::Tools)
            .with_edge(Node::Agent, Outcome::NoToolCalls, Node::End)
            .with_edge(Node::Tools, Outcome::Dispatched, Node::Agent)
    }

    /// [`Graph::with_tools`] plus a smart-edit attempt before ending.
    pub fn with_smart_edit() -> Self {
        Self::with_tools()
            .with_edge(Node::Agent, Outcome::NoToolCalls, Node::SmartEdit)
            .with_edge(Node::SmartEdit, Outcome::EditApplied, Node::Agent)
            .with_edge(Node::SmartEdit, Outcome::NothingRecognized, Node::End)
    }

    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::Chat => Self::chat_only(),
            Topology::Tools => Self::with_tools(),
            Topology::SmartEdit => Self::with_smart_edit(),
        }
    }

    pub fn entry(&self) -> Node {
        self.entry
    }

    pub fn next(&self, node: Node, outcome: Outcome) -> Result<Node, GraphError> {
        self.transitions
            .get(&(node, outcome))
            .copied()
            .ok_or(GraphError::MissingTransition { node, outcome })
    }

    /// Whether any path leads into `node`.
    pub fn visits(&self, node: Node) -> bool {
        self.entry == node || self.transitions.values().any(|&to| to == node)
    }

    /// Tool definitions are only worth sending when tool calls get dispatched.
    pub fn offers_tools(&self) -> bool {
        self.visits(Node::Tools)
    }

    /// Check that every reachable node handles each outcome it can report,
    /// and that End is reachable from every reachable node.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.entry == Node::End {
            return Err(GraphError::TerminalEntry(self.entry));
        }
        let reachable = self.reachable_from(self.entry);
        for &node in &reachable {
            for &outcome in node.outcomes() {
                self.next(node, outcome)?;
            }
        }
        for &node in &reachable {
            if !self.reachable_from(node).contains(&Node::End) {
                return Err(GraphError::EndUnreachable(node));
            }
        }
        Ok(())
    }

    fn reachable_from(&self, start: Node) -> Vec<Node> {
        let mut seen = vec![start];
        let mut frontier = vec![start];
        while let Some(node) = frontier.pop() {
            for (&(from, _), &to) in &self.transitions {
                if from == node && !seen.contains(&to) {
                    seen.push(to);
                    frontier.push(to);
                }
            }
        }
        seen
    }
}
