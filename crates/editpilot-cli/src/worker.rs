//! The per-line turn loop.
//!
//! One input line is one turn: it is parsed into a conversation, run through
//! the control loop to completion, and answered with exactly one state line.
//! A failed turn produces no state line, only a diagnostic on stderr, and
//! the loop moves on to the next input line.

use anyhow::Result;
use editpilot_agent::{Conversation, ControlLoop, Graph, LoopConfig};
use editpilot_channel::{ChannelError, HostLines, HostWriter, StdioChannel};
use editpilot_core::wire::parse_turns;
use editpilot_core::{AppConfig, WireState};
use editpilot_llm::{LlmClient, client_from_config};
use editpilot_observe::Observer;
use editpilot_tools::ToolRegistry;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Worker {
    lines: Arc<HostLines>,
    out: HostWriter,
    observer: Observer,
    llm: Box<dyn LlmClient>,
    registry: ToolRegistry,
    graph: Graph,
    loop_config: LoopConfig,
    system_prompt: String,
}

impl Worker {
    pub fn new(
        cfg: &AppConfig,
        workspace: Option<PathBuf>,
        lines: Arc<HostLines>,
        out: HostWriter,
        observer: Observer,
    ) -> Result<Self> {
        let llm = client_from_config(&cfg.llm)?;
        Ok(Self::with_client(cfg, workspace, lines, out, observer, llm))
    }

    pub fn with_client(
        cfg: &AppConfig,
        workspace: Option<PathBuf>,
        lines: Arc<HostLines>,
        out: HostWriter,
        observer: Observer,
        llm: Box<dyn LlmClient>,
    ) -> Self {
        let channel = StdioChannel::new(
            Arc::clone(&lines),
            out.clone(),
            cfg.channel.response_timeout(),
        );
        Self {
            registry: ToolRegistry::new(workspace, Arc::new(channel)),
            lines,
            out,
            observer,
            llm,
            graph: Graph::for_topology(cfg.agent.topology),
            loop_config: LoopConfig::from_app_config(cfg),
            system_prompt: cfg.agent.system_prompt.clone(),
        }
    }

    /// Serve turns until the host closes stdin.
    pub fn serve(&self) -> Result<()> {
        let control = ControlLoop::new(
            self.llm.as_ref(),
            &self.registry,
            &self.observer,
            self.graph.clone(),
            self.loop_config.clone(),
        )?;
        tracing::info!(workspace = ?self.registry.workspace(), "serving turns");
        let mut served = 0u64;
        loop {
            let line = match self.lines.next_turn_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(ChannelError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    self.observer.turn_error(&e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            served += 1;
            match self.handle_turn(&control, &line) {
                Ok(state) => self.out.write_line(&state)?,
                Err(e) => self.observer.turn_error(&format!("{e:#}")),
            }
        }
        tracing::info!(turns = served, "host closed input");
        Ok(())
    }

    fn handle_turn(&self, control: &ControlLoop<'_>, line: &str) -> Result<String> {
        let history = parse_turns(line)?;
        let conversation = Conversation::from_history(&self.system_prompt, history);
        let report = control.run(conversation)?;
        tracing::info!(
            llm_calls = report.llm_calls,
            tool_calls = report.tool_calls_made.len(),
            smart_edit = report.smart_edit_applied,
            finish = ?report.finish,
            "turn complete"
        );
        Ok(WireState::from_history(&report.messages).to_line()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editpilot_core::{LlmProvider, Topology};
    use serde_json::Value;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().expect("lock").clone())
                .expect("utf8")
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn echo_config(topology: Topology) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = LlmProvider::Echo;
        cfg.agent.topology = topology;
        cfg.agent.system_prompt = "be brief".to_string();
        cfg
    }

    fn serve(cfg: &AppConfig, workspace: Option<&str>, input: &str) -> (Vec<String>, Vec<String>) {
        serve_bytes(cfg, workspace, input.as_bytes())
    }

    fn serve_bytes(
        cfg: &AppConfig,
        workspace: Option<&str>,
        input: &[u8],
    ) -> (Vec<String>, Vec<String>) {
        let stdout = SharedBuf::default();
        let stderr = SharedBuf::default();
        let worker = Worker::new(
            cfg,
            workspace.map(PathBuf::from),
            HostLines::spawn(Cursor::new(input.to_vec())),
            HostWriter::new(Box::new(stdout.clone())),
            Observer::with_writer(Box::new(stderr.clone())),
        )
        .expect("worker");
        worker.serve().expect("serve");
        (stdout.lines(), stderr.lines())
    }

    fn state(line: &str) -> Vec<Value> {
        let value: Value = serde_json::from_str(line).expect("state json");
        value["messages"].as_array().expect("messages").clone()
    }

    #[test]
    fn each_turn_line_gets_one_state_line() {
        let input = "[{\"type\":\"human\",\"content\":\"hi\"}]\n\n[{\"role\":\"user\",\"content\":\"again\"}]\n";
        let (out, err) = serve(&echo_config(Topology::Chat), None, input);
        assert_eq!(out.len(), 2);
        assert!(err.is_empty());
        let first = state(&out[0]);
        assert_eq!(first[0]["type"], "system");
        assert_eq!(first[0]["content"], "be brief");
        assert_eq!(first[2]["type"], "assistant");
        assert_eq!(first[2]["content"], "[Echo] hi");
        assert_eq!(state(&out[1])[2]["content"], "[Echo] again");
    }

    #[test]
    fn emitted_state_can_be_fed_back() {
        let (out, _) = serve(
            &echo_config(Topology::Tools),
            None,
            "[{\"role\":\"user\",\"content\":\"one\"}]\n",
        );
        let mut messages = state(&out[0]);
        messages.push(serde_json::json!({"type": "user", "content": "two"}));
        let second = format!("{}\n", Value::Array(messages));
        let (out, _) = serve(&echo_config(Topology::Tools), None, &second);
        let messages = state(&out[0]);
        let systems = messages.iter().filter(|m| m["type"] == "system").count();
        assert_eq!(systems, 1);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[4]["content"], "[Echo] two");
    }

    #[test]
    fn malformed_line_is_reported_and_skipped() {
        let input = "{not json\n[{\"role\":\"user\",\"content\":\"ok\"}]\n";
        let (out, err) = serve(&echo_config(Topology::SmartEdit), None, input);
        assert_eq!(out.len(), 1);
        assert_eq!(err.len(), 1);
        assert!(err[0].starts_with("[PYTHON_ERROR] invalid turn payload"));
    }

    #[test]
    fn non_utf8_line_is_reported_and_skipped() {
        let input = b"[{\"role\":\"user\",\"content\":\"\xff\"}]\n[{\"role\":\"user\",\"content\":\"ok\"}]\n";
        let (out, err) = serve_bytes(&echo_config(Topology::Chat), None, input);
        assert_eq!(out.len(), 1);
        assert_eq!(state(&out[0])[2]["content"], "[Echo] ok");
        assert_eq!(err.len(), 1);
        assert!(err[0].starts_with("[PYTHON_ERROR] input line is not valid UTF-8"));
    }

    #[test]
    fn smart_edit_round_trips_through_the_host() {
        let input = concat!(
            "[{\"role\":\"user\",\"content\":\"replace lines 2-3 in src/a.rs with ```let x = 1;```\"}]\n",
            "{\"tool_output\":\"Replaced 2 lines\"}\n",
            "END_OF_TOOL_OUTPUT\n",
        );
        let (out, err) = serve(&echo_config(Topology::SmartEdit), Some("/ws"), input);
        assert_eq!(out.len(), 2);
        let command: Value = serde_json::from_str(&out[0]).expect("command json");
        assert_eq!(command["command"], "replaceText");
        assert_eq!(command["filePath"], "/ws/src/a.rs");
        assert_eq!(command["startLine"], 1);
        assert_eq!(command["endLine"], 3);
        assert_eq!(command["newText"], "let x = 1;");
        let messages = state(&out[1]);
        assert!(
            messages
                .iter()
                .any(|m| m["type"] == "tool" && m["content"] == "Replaced 2 lines")
        );
        assert_eq!(err, vec!["[TOOL_SUCCESS] replace_text executed successfully"]);
    }

    #[test]
    fn missing_workspace_never_writes_a_command() {
        let input =
            "[{\"role\":\"user\",\"content\":\"insert at cursor in a.py ```pass```\"}]\n";
        let (out, err) = serve(&echo_config(Topology::SmartEdit), None, input);
        assert_eq!(out.len(), 1);
        let messages = state(&out[0]);
        let tool = messages
            .iter()
            .find(|m| m["type"] == "tool")
            .expect("tool result");
        assert!(
            tool["content"]
                .as_str()
                .is_some_and(|c| c.starts_with("Error: No workspace is currently open"))
        );
        assert!(err[0].starts_with("[TOOL_ERROR] No workspace"));
    }
}
