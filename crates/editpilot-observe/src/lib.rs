use anyhow::{Result, anyhow};
use editpilot_core::{LogConfig, runtime_dir};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Prefix the editor extension looks for on a failed turn.
pub const TURN_ERROR_PREFIX: &str = "[PYTHON_ERROR] ";
pub const TOOL_SUCCESS_PREFIX: &str = "[TOOL_SUCCESS] ";
pub const TOOL_ERROR_PREFIX: &str = "[TOOL_ERROR] ";

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "EDITPILOT_LOG";

/// Writes the diagnostic lines the host shows from the error stream.
///
/// These lines are not parsed by the host; they exist so a person watching
/// the extension output can follow tool activity and failed turns.
pub struct Observer {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

impl Observer {
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn tool_success(&self, tool_name: &str) {
        tracing::info!(tool = tool_name, "tool executed");
        self.write_line(&format!(
            "{TOOL_SUCCESS_PREFIX}{tool_name} executed successfully"
        ));
    }

    pub fn tool_error(&self, message: &str) {
        tracing::warn!(error = message, "tool failed");
        self.write_line(&format!("{TOOL_ERROR_PREFIX}{message}"));
    }

    /// Report a turn that produced no output line.
    pub fn turn_error(&self, message: &str) {
        tracing::error!(error = message, "turn failed");
        // The host reads the error stream in chunks; keep it to one line.
        let single_line = message.replace('\n', " ");
        self.write_line(&format!("{TURN_ERROR_PREFIX}{single_line}"));
    }

    fn write_line(&self, line: &str) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }
}

/// Where tracing output goes for a given configuration.
///
/// An explicit `log.file` wins; otherwise the workspace runtime directory is
/// used. Without either, logs go to stderr.
pub fn log_destination(cfg: &LogConfig, workspace: Option<&Path>) -> Option<PathBuf> {
    cfg.file
        .clone()
        .or_else(|| workspace.map(|ws| runtime_dir(ws).join("worker.log")))
}

/// Install the global tracing subscriber.
///
/// stdout carries the host protocol, so logs are never written there.
pub fn init_tracing(cfg: &LogConfig, workspace: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    let file = log_destination(cfg, workspace).and_then(|path| open_log_file(&path).ok());
    let installed = match file {
        Some(file) => builder.with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
