//! Text-marker tool calling for backends without native function support.
//!
//! The model is instructed to emit `TOOL[Name]{json args}` markers inline;
//! this module extracts them from the response text and strips them out.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::message::ToolCall;

// Matches TOOL[Name]{json_args} or the bare TOOL[Name]() form.
static TOOL_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"TOOL\[(\w+)\]\{([^}]*)\}|TOOL\[(\w+)\]\(\)").expect("valid tool marker regex")
});

/// Instruction block appended to the system prompt in fallback mode
const FALLBACK_INSTRUCTIONS: &str = r#"

## IMPORTANT: Tool Calling Format

Since you don't have native function calling, use this text format to call tools:

TOOL[ToolName]{"param1": "value1", "param2": "value2"}

Examples:
- Read a file: TOOL[Read]{"file_path": "/path/to/file.py"}
- Write a file: TOOL[Write]{"file_path": "test.py", "content": "print('hello')"}
- Run bash: TOOL[Bash]{"command": "ls -la"}
- Search files: TOOL[Glob]{"pattern": "*.py"}
- Search content: TOOL[Grep]{"pattern": "def main", "path": "."}

Rules:
1. Each tool call must be on its own line
2. Use exact tool names (case-sensitive)
3. Use valid JSON for parameters (double quotes for strings)
4. Multiple tools: Put each on a separate line
5. After calling tools, wait for results before proceeding

Example multi-tool usage:
```
First, let me read the file:
TOOL[Read]{"file_path": "app.py"}

Then I'll check the git status:
TOOL[GitStatus]{}
```

The tool results will be provided back to you, then continue your response.
"#;

/// Extract tool-call markers from model text.
///
/// Returns the text with all markers removed (trimmed at the ends only)
/// and the calls in order of appearance, ids `fallback_0`, `fallback_1`, ...
pub fn parse(text: &str) -> (String, Vec<ToolCall>) {
    let mut tool_calls = Vec::new();
    let mut cleaned = text.to_string();

    for (i, caps) in TOOL_MARKER.captures_iter(text).enumerate() {
        let name = caps
            .get(1)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let args = caps.get(2).map_or("", |m| m.as_str());

        tool_calls.push(ToolCall {
            id: format!("fallback_{}", i),
            name: name.to_string(),
            parameters: parse_arguments(args),
        });

        cleaned = cleaned.replacen(&caps[0], "", 1);
    }

    (cleaned.trim().to_string(), tool_calls)
}

/// Append the tool-format instructions to a system prompt
pub fn inject_instructions(system_prompt: &str) -> String {
    format!("{}{}", system_prompt, FALLBACK_INSTRUCTIONS)
}

fn parse_arguments(args: &str) -> Value {
    if args.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str(&format!("{{{}}}", args)) {
        Ok(value) => value,
        Err(_) => parse_key_value(args),
    }
}

/// Permissive `key: value` parsing for args that are not quite JSON
fn parse_key_value(args: &str) -> Value {
    let mut parameters = Map::new();

    for part in split_outside_quotes(args) {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        parameters.insert(key.to_string(), coerce_value(value));
    }

    Value::Object(parameters)
}

/// Split on commas that sit outside double-quoted spans
fn split_outside_quotes(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in args.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Coerce bare text to bool or number where it clearly is one
fn coerce_value(value: &str) -> Value {
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_a_json_marker_and_strips_it() {
        let (cleaned, calls) = parse(r#"Reading now. TOOL[Read]{"file_path": "x.py"} done."#);
        assert_eq!(cleaned, "Reading now.  done.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "fallback_0");
        assert_eq!(calls[0].name, "Read");
        assert_eq!(calls[0].parameters, json!({"file_path": "x.py"}));
    }

    #[test]
    fn empty_parens_form_yields_empty_parameters() {
        let (cleaned, calls) = parse("Checking: TOOL[GitStatus]()");
        assert_eq!(cleaned, "Checking:");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "GitStatus");
        assert_eq!(calls[0].parameters, json!({}));
    }

    #[test]
    fn empty_braces_yield_empty_parameters() {
        let (_, calls) = parse("TOOL[GitStatus]{}");
        assert_eq!(calls[0].parameters, json!({}));
    }

    #[test]
    fn multiple_markers_keep_appearance_order() {
        let text = "TOOL[Read]{\"file_path\": \"a\"}\nTOOL[Grep]{\"pattern\": \"main\"}";
        let (cleaned, calls) = parse(text);
        assert!(cleaned.is_empty());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "fallback_0");
        assert_eq!(calls[0].name, "Read");
        assert_eq!(calls[1].id, "fallback_1");
        assert_eq!(calls[1].name, "Grep");
    }

    #[test]
    fn malformed_json_falls_back_to_key_value_parsing() {
        let (_, calls) = parse("TOOL[Grep]{pattern: \"a, b\", path: src, limit: 5}");
        assert_eq!(
            calls[0].parameters,
            json!({"pattern": "a, b", "path": "src", "limit": 5})
        );
    }

    #[test]
    fn key_value_coercion_handles_bools_and_floats() {
        let (_, calls) = parse("TOOL[Search]{recursive: true, cutoff: 0.5, name: test}");
        assert_eq!(
            calls[0].parameters,
            json!({"recursive": true, "cutoff": 0.5, "name": "test"})
        );
    }

    #[test]
    fn text_without_markers_is_untouched() {
        let (cleaned, calls) = parse("Just a normal answer.");
        assert_eq!(cleaned, "Just a normal answer.");
        assert!(calls.is_empty());
    }

    #[test]
    fn injected_instructions_extend_the_prompt() {
        let prompt = inject_instructions("You are helpful.");
        assert!(prompt.starts_with("You are helpful."));
        assert!(prompt.contains("## IMPORTANT: Tool Calling Format"));
        assert!(prompt.contains("TOOL[ToolName]"));
        assert!(prompt.ends_with("then continue your response.\n"));
    }
}
