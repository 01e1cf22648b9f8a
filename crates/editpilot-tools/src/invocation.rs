use crate::ToolError;
use crate::validation::validate_tool_args;
use editpilot_channel::Command;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceTextArgs {
    pub file_path: String,
    pub start_line: u32,
    pub start_char: u32,
    pub end_line: u32,
    pub end_char: u32,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertTextArgs {
    pub file_path: String,
    pub line_number: u32,
    pub char_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAndReplaceArgs {
    pub file_path: String,
    pub search_regex: String,
    pub replace_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexSearchArgs {
    pub query: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Every operation the model can ask for, with its typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    ReadFile(PathArgs),
    CreateFile(CreateFileArgs),
    ListFiles(PathArgs),
    ReplaceText(ReplaceTextArgs),
    InsertText(InsertTextArgs),
    SearchAndReplace(SearchAndReplaceArgs),
    SemanticSearch(QueryArgs),
    RegexSearch(RegexSearchArgs),
}

pub const TOOL_NAMES: [&str; 8] = [
    "read_file",
    "create_file",
    "list_files",
    "replace_text",
    "insert_text",
    "search_and_replace",
    "semantic_search",
    "regex_search",
];

impl ToolInvocation {
    /// Resolve a model tool call into a typed invocation.
    ///
    /// `arguments` is the raw JSON text from the model. A blank string is
    /// treated as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let args: Value = serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
            tool: name.to_string(),
            message: format!("arguments are not valid JSON: {e}"),
        })?;
        validate_tool_args(name, &args).map_err(|message| ToolError::InvalidArguments {
            tool: name.to_string(),
            message,
        })?;
        Self::from_value(name, args)
    }

    pub(crate) fn from_value(name: &str, args: Value) -> Result<Self, ToolError> {
        Ok(match name {
            "read_file" => Self::ReadFile(typed(name, args)?),
            "create_file" => Self::CreateFile(typed(name, args)?),
            "list_files" => Self::ListFiles(typed(name, args)?),
            "replace_text" => Self::ReplaceText(typed(name, args)?),
            "insert_text" => Self::InsertText(typed(name, args)?),
            "search_and_replace" => Self::SearchAndReplace(typed(name, args)?),
            "semantic_search" => Self::SemanticSearch(typed(name, args)?),
            "regex_search" => Self::RegexSearch(typed(name, args)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile(_) => "read_file",
            Self::CreateFile(_) => "create_file",
            Self::ListFiles(_) => "list_files",
            Self::ReplaceText(_) => "replace_text",
            Self::InsertText(_) => "insert_text",
            Self::SearchAndReplace(_) => "search_and_replace",
            Self::SemanticSearch(_) => "semantic_search",
            Self::RegexSearch(_) => "regex_search",
        }
    }

    /// Build the host command, resolving every path against `workspace`.
    pub fn to_command(&self, workspace: &Path) -> Command {
        let resolve = |p: &str| workspace.join(p).to_string_lossy().into_owned();
        match self {
            Self::ReadFile(a) => Command::ReadFile {
                path: resolve(&a.path),
            },
            Self::CreateFile(a) => Command::CreateFile {
                path: resolve(&a.path),
                content: a.content.clone(),
            },
            Self::ListFiles(a) => Command::ListFiles {
                path: resolve(&a.path),
            },
            Self::ReplaceText(a) => Command::ReplaceText {
                file_path: resolve(&a.file_path),
                start_line: a.start_line,
                start_char: a.start_char,
                end_line: a.end_line,
                end_char: a.end_char,
                new_text: a.new_text.clone(),
            },
            Self::InsertText(a) => Command::InsertText {
                file_path: resolve(&a.file_path),
                line_number: a.line_number,
                char_number: a.char_number,
                text: a.text.clone(),
            },
            Self::SearchAndReplace(a) => Command::SearchAndReplace {
                file_path: resolve(&a.file_path),
                search_regex: a.search_regex.clone(),
                replace_text: a.replace_text.clone(),
            },
            Self::SemanticSearch(a) => Command::SemanticSearch {
                query: a.query.clone(),
            },
            Self::RegexSearch(a) => Command::RegexSearch {
                query: a.query.clone(),
                file_path: a
                    .file_path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(resolve),
            },
        }
    }
}

fn typed<T: DeserializeOwned>(name: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unknown_tool_keeps_the_requested_name() {
        let err = ToolInvocation::parse("delete_everything", "{}").unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "delete_everything"));
        assert!(err.to_string().contains("delete_everything"));
    }

    #[test]
    fn malformed_argument_json_is_invalid_arguments() {
        let err = ToolInvocation::parse("read_file", "{\"path\":").unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn blank_arguments_fail_validation_not_parsing() {
        let err = ToolInvocation::parse("read_file", "").unwrap_err();
        assert!(err.to_string().contains("path"), "{err}");
    }

    #[test]
    fn parses_camel_case_edit_arguments() {
        let inv = ToolInvocation::parse(
            "replace_text",
            r#"{"filePath":"src/lib.rs","startLine":2,"startChar":0,"endLine":5,"endChar":0,"newText":"x"}"#,
        )
        .expect("parse");
        assert_eq!(
            inv,
            ToolInvocation::ReplaceText(ReplaceTextArgs {
                file_path: "src/lib.rs".to_string(),
                start_line: 2,
                start_char: 0,
                end_line: 5,
                end_char: 0,
                new_text: "x".to_string(),
            })
        );
    }

    #[test]
    fn commands_resolve_paths_against_workspace() {
        let ws = PathBuf::from("/work/project");
        let read = ToolInvocation::parse("read_file", r#"{"path":"src/main.rs"}"#).expect("read");
        assert_eq!(
            read.to_command(&ws),
            Command::ReadFile {
                path: "/work/project/src/main.rs".to_string()
            }
        );

        let search = ToolInvocation::parse("regex_search", r#"{"query":"todo"}"#).expect("search");
        assert_eq!(
            search.to_command(&ws),
            Command::RegexSearch {
                query: "todo".to_string(),
                file_path: None
            }
        );

        let scoped = ToolInvocation::parse("regex_search", r#"{"query":"todo","filePath":"a.rs"}"#)
            .expect("scoped");
        assert_eq!(
            scoped.to_command(&ws),
            Command::RegexSearch {
                query: "todo".to_string(),
                file_path: Some("/work/project/a.rs".to_string())
            }
        );
    }

    #[test]
    fn every_tool_name_resolves() {
        for name in TOOL_NAMES {
            let err = ToolInvocation::parse(name, "{}");
            // Empty arguments fail validation, never name resolution.
            assert!(
                !matches!(err, Err(ToolError::UnknownTool(_))),
                "{name} should be known"
            );
        }
    }
}
