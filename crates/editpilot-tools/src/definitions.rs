//! Function-calling schemas offered to the model.

use editpilot_core::ToolDefinition;
use serde_json::{Value, json};

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn position(description: &str) -> Value {
    json!({"type": "integer", "minimum": 0, "description": description})
}

/// Definitions for every registry tool, in registry order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "read_file",
            "Reads the content of a specified file.",
            object(
                json!({"path": {"type": "string", "description": "The path to the file to read, relative to the workspace root."}}),
                &["path"],
            ),
        ),
        ToolDefinition::function(
            "create_file",
            "Creates a new file with the specified content, overwriting any existing file.",
            object(
                json!({
                    "path": {"type": "string", "description": "The path to the new file."},
                    "content": {"type": "string", "description": "The content to write to the new file."}
                }),
                &["path", "content"],
            ),
        ),
        ToolDefinition::function(
            "list_files",
            "Lists the contents of a specified directory.",
            object(
                json!({"path": {"type": "string", "description": "The path to the directory to list. Use \".\" for the workspace root."}}),
                &["path"],
            ),
        ),
        ToolDefinition::function(
            "replace_text",
            "Replaces text in a specific range within a file. Positions are 0-based; the end position is exclusive.",
            object(
                json!({
                    "filePath": {"type": "string", "description": "The path to the file to modify."},
                    "startLine": position("The starting line number (0-indexed)."),
                    "startChar": position("The starting character number (0-indexed)."),
                    "endLine": position("The ending line number (0-indexed)."),
                    "endChar": position("The ending character number (0-indexed)."),
                    "newText": {"type": "string", "description": "The new text to insert."}
                }),
                &["filePath", "startLine", "startChar", "endLine", "endChar", "newText"],
            ),
        ),
        ToolDefinition::function(
            "insert_text",
            "Inserts text at a specific position within a file. Position (0, 0) targets the active cursor when the file is open.",
            object(
                json!({
                    "filePath": {"type": "string", "description": "The path to the file to modify."},
                    "lineNumber": position("The line number to insert at (0-indexed)."),
                    "charNumber": position("The character number to insert at (0-indexed)."),
                    "text": {"type": "string", "description": "The text to insert."}
                }),
                &["filePath", "lineNumber", "charNumber", "text"],
            ),
        ),
        ToolDefinition::function(
            "search_and_replace",
            "Performs a regex-based search and replace over every match within a file.",
            object(
                json!({
                    "filePath": {"type": "string", "description": "The path to the file to modify."},
                    "searchRegex": {"type": "string", "description": "The regex pattern to search for."},
                    "replaceText": {"type": "string", "description": "The text to replace matches with."}
                }),
                &["filePath", "searchRegex", "replaceText"],
            ),
        ),
        ToolDefinition::function(
            "semantic_search",
            "Searches workspace symbols using the editor's code-intelligence index.",
            object(
                json!({"query": {"type": "string", "description": "The symbol or concept to search for."}}),
                &["query"],
            ),
        ),
        ToolDefinition::function(
            "regex_search",
            "Performs a regex-based code search across the workspace or within one file.",
            object(
                json!({
                    "query": {"type": "string", "description": "The regex pattern to search for."},
                    "filePath": {"type": "string", "description": "Optional: the path to a specific file to search within."}
                }),
                &["query"],
            ),
        ),
    ]
}
