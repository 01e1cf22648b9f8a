use anyhow::Result;
use clap::Parser;
use editpilot_channel::{HostLines, HostWriter};
use editpilot_core::{AppConfig, LlmProvider, Topology, WORKSPACE_ROOT_ENV};
use editpilot_observe::Observer;
use std::path::PathBuf;

mod worker;

use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "editpilot-worker")]
#[command(
    about = "Coding assistant worker for the editor extension; speaks line-delimited JSON over stdio",
    long_about = None
)]
struct Cli {
    /// Folder open in the editor. Tools refuse to run without one.
    #[arg(long, env = WORKSPACE_ROOT_ENV)]
    workspace_root: Option<PathBuf>,

    /// Override the LLM model for this process.
    #[arg(long)]
    model: Option<String>,

    /// LLM provider: openai-compatible or echo.
    #[arg(long)]
    provider: Option<String>,

    /// Chat-completions endpoint URL.
    #[arg(long)]
    endpoint: Option<String>,

    /// Control-loop shape: chat, tools or smart-edit.
    #[arg(long)]
    topology: Option<String>,

    /// Maximum LLM calls per turn.
    #[arg(long)]
    max_turns: Option<usize>,

    /// Seconds to wait for each host response; 0 waits forever.
    #[arg(long = "response-timeout")]
    response_timeout: Option<u64>,

    /// Write logs to this file instead of the workspace log.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn workspace(&self) -> Option<PathBuf> {
        self.workspace_root
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Flags win over every settings file.
    fn apply_to(&self, cfg: &mut AppConfig) -> Result<()> {
        if let Some(model) = &self.model {
            cfg.llm.model = model.clone();
        }
        if let Some(provider) = &self.provider {
            cfg.llm.provider = provider.parse::<LlmProvider>()?;
        }
        if let Some(endpoint) = &self.endpoint {
            cfg.llm.endpoint = endpoint.clone();
        }
        if let Some(topology) = &self.topology {
            cfg.agent.topology = topology.parse::<Topology>()?;
        }
        if let Some(max_turns) = self.max_turns {
            cfg.agent.max_turns = max_turns;
        }
        if let Some(timeout) = self.response_timeout {
            cfg.channel.response_timeout_seconds = timeout;
        }
        if let Some(file) = &self.log_file {
            cfg.log.file = Some(file.clone());
        }
        if self.verbose {
            cfg.log.level = "debug".to_string();
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace = cli.workspace();
    let mut cfg = AppConfig::load(workspace.as_deref())?;
    cli.apply_to(&mut cfg)?;
    editpilot_observe::init_tracing(&cfg.log, workspace.as_deref())?;
    tracing::info!(
        topology = ?cfg.agent.topology,
        provider = ?cfg.llm.provider,
        "worker starting"
    );

    let worker = Worker::new(
        &cfg,
        workspace,
        HostLines::stdin(),
        HostWriter::stdout(),
        Observer::stderr(),
    )?;
    worker.serve()
}
