//! Pre-execution validation for tool call arguments.
//!
//! Catches malformed arguments before a command reaches the host, giving the
//! model a clear message to self-correct with.

use serde_json::Value;

/// Validate tool arguments before execution.
///
/// Returns `Err(message)` with a human-readable description when the
/// arguments are malformed. Unknown tool names are rejected earlier, when
/// the invocation is resolved.
pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), String> {
    if !args.is_object() {
        return Err(format!(
            "arguments must be a JSON object, got {}",
            preview(args)
        ));
    }
    match tool_name {
        "read_file" | "list_files" => require_string(args, "path", "path is required"),
        "create_file" => {
            require_string(args, "path", "path of the file to create is required")?;
            // Empty content is a valid empty file, but the field must exist.
            require_present_string(args, "content")
        }
        "replace_text" => {
            require_string(args, "filePath", "path of the file to modify is required")?;
            for field in ["startLine", "startChar", "endLine", "endChar"] {
                require_position(args, field)?;
            }
            require_present_string(args, "newText")
        }
        "insert_text" => {
            require_string(args, "filePath", "path of the file to modify is required")?;
            require_position(args, "lineNumber")?;
            require_position(args, "charNumber")?;
            require_present_string(args, "text")
        }
        "search_and_replace" => {
            require_string(args, "filePath", "path of the file to modify is required")?;
            require_string(args, "searchRegex", "regex pattern is required")?;
            require_present_string(args, "replaceText")
        }
        "semantic_search" => require_string(args, "query", "search query is required"),
        "regex_search" => {
            require_string(args, "query", "regex pattern is required")?;
            match args.get("filePath") {
                None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
                Some(v) => Err(format!("filePath: expected string, got {}", preview(v))),
            }
        }
        _ => Ok(()),
    }
}

fn require_string(args: &Value, field: &str, msg: &str) -> Result<(), String> {
    match args.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        Some(Value::String(_)) => Err(format!("{field}: {msg} (got empty string)")),
        Some(v) => Err(format!("{field}: expected string, got {}", preview(v))),
        None => Err(format!("{field}: {msg}")),
    }
}

fn require_present_string(args: &Value, field: &str) -> Result<(), String> {
    match args.get(field) {
        Some(Value::String(_)) => Ok(()),
        Some(v) => Err(format!("{field}: expected string, got {}", preview(v))),
        None => Err(format!(
            "'{field}' field is required (use empty string \"\" for none)"
        )),
    }
}

/// Editor positions are 0-based line/character offsets.
fn require_position(args: &Value, field: &str) -> Result<(), String> {
    match args.get(field) {
        Some(v) if v.as_u64().is_some_and(|n| n <= u64::from(u32::MAX)) => Ok(()),
        Some(v) if v.as_i64().is_some_and(|n| n < 0) => {
            Err(format!("{field} must be >= 0 (positions are 0-based)"))
        }
        Some(v) => Err(format!(
            "{field}: expected a non-negative integer, got {}",
            preview(v)
        )),
        None => Err(format!("{field}: 0-based position is required")),
    }
}

fn preview(v: &Value) -> String {
    v.to_string().chars().take(50).collect()
}
