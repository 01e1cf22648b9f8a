use crate::{DEFAULT_SYSTEM_PROMPT, Result, runtime_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable the editor extension sets to the open folder.
pub const WORKSPACE_ROOT_ENV: &str = "VSCODE_WORKSPACE_ROOT";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub channel: ChannelConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        let home = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())?;
        Some(Path::new(&home).join(".editpilot/settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    /// Load defaults, then the user settings file, then the project settings
    /// file when a workspace is known. Later sources win key by key.
    pub fn load(workspace: Option<&Path>) -> Result<Self> {
        let mut paths = Vec::new();
        if let Some(user) = Self::user_settings_path() {
            paths.push(user);
        }
        if let Some(workspace) = workspace {
            paths.push(Self::project_settings_path(workspace));
        }
        Self::load_from(&paths)
    }

    pub fn load_from(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid settings file {}: {e}", path.display()))?;
            merge_json_value(&mut merged, &value);
        }
        Ok(serde_json::from_value(merged)?)
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProvider {
    /// Any endpoint speaking the OpenAI chat-completions format.
    OpenaiCompatible,
    /// Offline provider that echoes the latest user message.
    Echo,
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai-compatible" | "openai" => Ok(Self::OpenaiCompatible),
            "echo" => Ok(Self::Echo),
            other => Err(anyhow::anyhow!(
                "unsupported llm.provider '{other}' (supported: openai-compatible, echo)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub max_retries: u8,
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenaiCompatible,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_seconds: 60,
            max_retries: 3,
            retry_base_ms: 400,
        }
    }
}

impl LlmConfig {
    /// API key from the configured environment variable, falling back to the
    /// inline `api_key` setting. Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.api_key
                    .as_ref()
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
    }
}

/// Which control-loop graph the worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Agent only, no tools offered.
    Chat,
    /// Agent and tool dispatch.
    Tools,
    /// Agent, tool dispatch and the smart-edit fallback.
    #[default]
    SmartEdit,
}

impl std::str::FromStr for Topology {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "tools" => Ok(Self::Tools),
            "smart-edit" | "smart_edit" => Ok(Self::SmartEdit),
            other => Err(anyhow::anyhow!(
                "unsupported agent.topology '{other}' (supported: chat, tools, smart-edit)"
            )),
        }
    }
}

fn default_max_turns() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub topology: Topology,
    /// Maximum LLM calls per turn before the loop is cut short.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Append a short assistant note after every successful tool call.
    pub acknowledge_tool_results: bool,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            max_turns: default_max_turns(),
            acknowledge_tool_results: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Seconds to wait for the host to answer a command. `0` waits forever.
    pub response_timeout_seconds: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout_seconds: 120,
        }
    }
}

impl ChannelConfig {
    pub fn response_timeout(&self) -> Option<std::time::Duration> {
        (self.response_timeout_seconds > 0)
            .then(|| std::time::Duration::from_secs(self.response_timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn merge_json_value_is_idempotent_for_flat_objects(
            base in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12),
            overlay in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12),
        ) {
            let mut base_value = json!(base);
            let overlay_value = json!(overlay);
            merge_json_value(&mut base_value, &overlay_value);
            let once = base_value.clone();
            merge_json_value(&mut base_value, &overlay_value);
            prop_assert_eq!(base_value, once);
        }
    }

    #[test]
    fn defaults_use_smart_edit_topology_with_bounded_turns() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.topology, Topology::SmartEdit);
        assert_eq!(cfg.agent.max_turns, 50);
        assert!(cfg.agent.acknowledge_tool_results);
        assert_eq!(
            cfg.channel.response_timeout(),
            Some(std::time::Duration::from_secs(120))
        );
    }

    #[test]
    fn later_settings_files_override_earlier_ones_per_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let user = dir.path().join("user.json");
        let project = dir.path().join("project.json");
        fs::write(
            &user,
            r#"{"llm":{"model":"user-model","temperature":0.7},"agent":{"max_turns":5}}"#,
        )
        .expect("user settings");
        fs::write(&project, r#"{"llm":{"model":"project-model"}}"#).expect("project settings");

        let cfg = AppConfig::load_from(&[user, project, dir.path().join("missing.json")])
            .expect("load");
        assert_eq!(cfg.llm.model, "project-model");
        assert!((cfg.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.agent.max_turns, 5);
        assert_eq!(cfg.channel.response_timeout_seconds, 120);
    }

    #[test]
    fn invalid_settings_file_names_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("settings.json");
        fs::write(&bad, "{not json").expect("write");
        let err = AppConfig::load_from(&[bad]).expect_err("should fail");
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let cfg = ChannelConfig {
            response_timeout_seconds: 0,
        };
        assert_eq!(cfg.response_timeout(), None);
    }

    #[test]
    fn provider_and_topology_parse_from_flags() {
        assert_eq!(
            "openai".parse::<LlmProvider>().expect("provider"),
            LlmProvider::OpenaiCompatible
        );
        assert_eq!("ECHO".parse::<LlmProvider>().expect("echo"), LlmProvider::Echo);
        assert_eq!("tools".parse::<Topology>().expect("tools"), Topology::Tools);
        assert!("graph".parse::<Topology>().is_err());
    }
}
