//! Agent, chain, project and session records.
//!
//! These are the minimal records the orchestration core reads and writes. Chain
//! steps reference agents by id; descriptors are never copied into chains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ─── Agents ──────────────────────────────────────────────────────────────────

/// Dispatch category derived from a descriptor's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Delegates to the shared retrieval collaborator.
    Rag,
    /// Everything else: loaded from the descriptor's code location.
    Code,
}

/// A registered pluggable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `rag`, `code` or any other tag (`general`, `utility`, ...).
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Opaque key/value configuration handed to the agent at construction.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// `builtin:<unit>` or a filesystem path. Required for non-`rag` types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_location: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AgentDescriptor {
    /// `rag` and any `*document*` tag dispatch to retrieval.
    pub fn kind(&self) -> AgentKind {
        let tag = self.agent_type.to_lowercase();
        if tag == "rag" || tag.contains("document") {
            AgentKind::Rag
        } else {
            AgentKind::Code
        }
    }

    /// Display name with whitespace, `-` and `_` removed. Used for implementation
    /// lookup (`<compact>Agent`) and as the fallback tool name.
    pub fn compact_name(&self) -> String {
        self.name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect()
    }

    /// Description shown to the LLM; falls back to the display name.
    pub fn description_or_name(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// String value from the configuration map.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

// ─── Chains ──────────────────────────────────────────────────────────────────

/// One step of a chain. `name`/`agent_type` are cached for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl ChainStep {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: None,
            agent_type: None,
            context: None,
            files: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered sequence of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionChain {
    pub steps: Vec<ChainStep>,
}

impl ExecutionChain {
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self { steps }
    }

    /// One context-free step per agent id, in order.
    pub fn from_agent_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: ids.into_iter().map(ChainStep::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn agent_ids(&self) -> BTreeSet<&str> {
        self.steps.iter().map(|s| s.agent_id.as_str()).collect()
    }

    /// Every step's agent id appears in `other`.
    pub fn is_subset_of(&self, other: &ExecutionChain) -> bool {
        let allowed = other.agent_ids();
        self.steps
            .iter()
            .all(|s| allowed.contains(s.agent_id.as_str()))
    }

    /// Steps whose agent id appears in `other`, order preserved.
    pub fn retain_authorized(&self, other: &ExecutionChain) -> ExecutionChain {
        let allowed = other.agent_ids();
        ExecutionChain {
            steps: self
                .steps
                .iter()
                .filter(|s| allowed.contains(s.agent_id.as_str()))
                .cloned()
                .collect(),
        }
    }
}

// ─── Projects ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Agent ids registered with the project. Scope of the fallback tools.
    #[serde(default)]
    pub agents: Vec<String>,
    /// Project default chain.
    #[serde(default)]
    pub chain_config: ExecutionChain,
    #[serde(default)]
    pub allow_user_chaining: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

// ─── Retrieval ───────────────────────────────────────────────────────────────

/// A retrieved chunk of a project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub content: String,
    /// Original filename the chunk came from.
    pub source: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub score: f64,
}

impl Snippet {
    /// Identity used for de-duplication across tool calls and chain steps.
    pub fn key(&self) -> (&str, usize) {
        (self.source.as_str(), self.chunk_index)
    }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One append-only conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Snippet>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Snippet>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }
}

/// Conversation keyed by (project, requester).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub project_id: String,
    pub requester: String,
    pub turns: Vec<ChatTurn>,
    /// Chain used by the most recent turn; `None` when the fallback agent answered.
    pub last_chain: Option<ExecutionChain>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, agent_type: &str) -> AgentDescriptor {
        AgentDescriptor {
            id: "a1".into(),
            name: name.into(),
            description: None,
            agent_type: agent_type.into(),
            config: Default::default(),
            code_location: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_and_compact_name() {
        assert_eq!(descriptor("Docs", "RAG").kind(), AgentKind::Rag);
        assert_eq!(descriptor("Docs", "document_qa").kind(), AgentKind::Rag);
        assert_eq!(descriptor("x", "general").kind(), AgentKind::Code);
        assert_eq!(
            descriptor("Translate to-Hindi_v2", "code").compact_name(),
            "TranslatetoHindiv2"
        );
        assert_eq!(descriptor("Echo", "code").description_or_name(), "Echo");
    }

    #[test]
    fn test_subset_and_retain() {
        let default = ExecutionChain::from_agent_ids(["A", "B"]);
        let only_a = ExecutionChain::from_agent_ids(["A"]);
        let a_and_c = ExecutionChain::from_agent_ids(["C", "A"]);
        assert!(only_a.is_subset_of(&default));
        assert!(!a_and_c.is_subset_of(&default));
        assert_eq!(
            a_and_c.retain_authorized(&default),
            ExecutionChain::from_agent_ids(["A"])
        );
        assert!(ExecutionChain::default().is_subset_of(&default));
    }

    #[test]
    fn test_chain_step_serde_uses_type_key() {
        let json = r#"[{"agent_id":"a1","type":"rag","context":"be brief"}]"#;
        let chain: ExecutionChain = serde_json::from_str(json).unwrap();
        assert_eq!(chain.steps[0].agent_type.as_deref(), Some("rag"));
        assert!(chain.steps[0].files.is_empty());
        let back = serde_json::to_string(&chain).unwrap();
        assert!(back.contains("\"type\":\"rag\""));
        assert!(!back.contains("\"name\""));
    }
}
