pub mod definitions;
pub mod invocation;
pub mod validation;

pub use definitions::tool_definitions;
pub use invocation::{
    CreateFileArgs, InsertTextArgs, PathArgs, QueryArgs, RegexSearchArgs, ReplaceTextArgs,
    SearchAndReplaceArgs, TOOL_NAMES, ToolInvocation,
};

use editpilot_channel::{ChannelError, CommandChannel};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("No workspace is currently open. Please open a folder in the editor first.")]
    WorkspaceNotOpen,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Executes tool invocations against the host.
///
/// The workspace root is fixed at construction; without one every tool
/// fails before anything is written to the channel.
#[derive(Clone)]
pub struct ToolRegistry {
    workspace: Option<PathBuf>,
    channel: Arc<dyn CommandChannel>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    pub fn new(workspace: Option<PathBuf>, channel: Arc<dyn CommandChannel>) -> Self {
        Self { workspace, channel }
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Resolve and run a model tool call.
    pub fn execute(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let invocation = ToolInvocation::parse(name, arguments)?;
        self.run(&invocation)
    }

    /// Run an already-typed invocation through one host round trip.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<String, ToolError> {
        let Some(workspace) = self.workspace.as_deref() else {
            return Err(ToolError::WorkspaceNotOpen);
        };
        let command = invocation.to_command(workspace);
        tracing::debug!(tool = invocation.name(), command = command.name(), "running tool");
        Ok(self.channel.round_trip(&command)?)
    }
}
