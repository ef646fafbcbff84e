//! OpenAI-compatible chat types and the orchestration event sink.

use serde::{Deserialize, Serialize};

pub use chainlite_core::text::safe_truncate;

// ─── OpenAI-compatible chat types ───────────────────────────────────────────

/// A chat message in OpenAI format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role("system", Some(content.to_string()))
    }

    pub fn user(content: &str) -> Self {
        Self::with_role("user", Some(content.to_string()))
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role("assistant", Some(content.to_string()))
    }

    pub fn assistant_with_tool_calls(content: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role("assistant", content.map(|s| s.to_string()))
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role("tool", Some(content.to_string()))
        }
    }
}

/// A tool call from the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Wire format of the chat API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    /// `/chat/completions` (OpenAI, Groq, DeepSeek, Ollama, ...)
    OpenAI,
    /// `/v1/messages` (Anthropic)
    Claude,
}

/// OpenAI-compatible tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }

    /// Claude expects `{ name, description, input_schema }`.
    pub fn to_claude_format(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.function.name,
            "description": self.function.description,
            "input_schema": self.function.parameters
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Result of executing one tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

/// Parse `tool_use` content blocks from a Claude response.
pub fn parse_claude_tool_calls(content_blocks: &[serde_json::Value]) -> Vec<ToolCall> {
    content_blocks
        .iter()
        .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("tool_use"))
        .map(|block| {
            let field = |k: &str| {
                block
                    .get(k)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            let input = block
                .get("input")
                .cloned()
                .unwrap_or(serde_json::json!({}));
            let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
            ToolCall {
                id: field("id"),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: field("name"),
                    arguments,
                },
            }
        })
        .collect()
}

// ─── Event sink ─────────────────────────────────────────────────────────────

/// Observer for chain steps and fallback tool calls (CLI, logs, tests).
pub trait ChainEventSink: Send {
    fn on_step_start(&mut self, _index: usize, _agent: &str) {}
    fn on_step_finish(&mut self, _index: usize, _agent: &str, _output: &str, _failed: bool) {}
    fn on_step_skipped(&mut self, _index: usize, _agent_id: &str) {}
    fn on_tool_call(&mut self, _name: &str, _arguments: &str) {}
    fn on_tool_result(&mut self, _name: &str, _result: &str, _is_error: bool) {}
    /// Assistant text produced by the fallback loop.
    fn on_text(&mut self, _text: &str) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ChainEventSink for SilentSink {}

/// Records events as strings; handy for asserting execution order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<String>,
}

impl ChainEventSink for RecordingSink {
    fn on_step_start(&mut self, index: usize, agent: &str) {
        self.events.push(format!("step_start:{}:{}", index, agent));
    }

    fn on_step_finish(&mut self, index: usize, agent: &str, _output: &str, failed: bool) {
        let tag = if failed { "step_failed" } else { "step_done" };
        self.events.push(format!("{}:{}:{}", tag, index, agent));
    }

    fn on_step_skipped(&mut self, index: usize, agent_id: &str) {
        self.events.push(format!("step_skipped:{}:{}", index, agent_id));
    }

    fn on_tool_call(&mut self, name: &str, _arguments: &str) {
        self.events.push(format!("tool_call:{}", name));
    }

    fn on_tool_result(&mut self, name: &str, _result: &str, is_error: bool) {
        let tag = if is_error { "tool_error" } else { "tool_result" };
        self.events.push(format!("{}:{}", tag, name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_skips_none() {
        let v = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(v, json!({"role": "user", "content": "hi"}));
        let v = serde_json::to_value(ChatMessage::tool_result("c1", "out")).unwrap();
        assert_eq!(v["tool_call_id"], "c1");
        assert_eq!(v["role"], "tool");
    }

    #[test]
    fn test_parse_claude_tool_calls() {
        let blocks = vec![
            json!({"type": "text", "text": "thinking"}),
            json!({"type": "tool_use", "id": "tu_1", "name": "KnowledgeBase", "input": {"query": "total"}}),
        ];
        let calls = parse_claude_tool_calls(&blocks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "KnowledgeBase");
        assert_eq!(calls[0].function.arguments, r#"{"query":"total"}"#);
    }

    #[test]
    fn test_tool_definition_claude_format() {
        let def = ToolDefinition::function("t", "d", json!({"type": "object"}));
        assert_eq!(def.to_claude_format()["input_schema"]["type"], "object");
    }
}
