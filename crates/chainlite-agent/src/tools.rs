//! Callable tools for the fallback loop.
//!
//! Every tool takes a single `query` string. Retrieval tools report the
//! snippets they return through a [`SourceCollector`].

use async_trait::async_trait;
use chainlite_core::text::sanitize_tool_name;
use chainlite_core::ChainError;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::capability::{Agent, SourceCollector};
use crate::retrieval::{join_contents, Retriever, NO_KNOWLEDGE_FOUND};
use crate::types::{ToolDefinition, ToolResult};

pub const KNOWLEDGE_BASE_TOOL: &str = "KnowledgeBase";

const KNOWLEDGE_BASE_DESCRIPTION: &str = "Useful for answering questions based on the uploaded \
project documents. Use this whenever you need to look up information from the project's files. \
Input should be a search query.";

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, input: &str) -> Result<String, ChainError>;
}

/// `{"query": string}`, the only parameter any tool takes.
pub fn query_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Input text or search query"
            }
        },
        "required": ["query"]
    })
}

/// Pull the input string out of tool-call arguments. Models sometimes send a
/// bare string or a differently named key; both are accepted.
pub fn tool_input(arguments: &str) -> String {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map
            .get("query")
            .or_else(|| map.get("input"))
            .or_else(|| map.values().find(|v| v.is_string()))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_default(),
        Ok(Value::String(s)) => s,
        _ => arguments.to_string(),
    }
}

/// Project-wide document search.
pub struct KnowledgeBaseTool {
    project: String,
    retriever: Arc<dyn Retriever>,
    k: usize,
    sources: SourceCollector,
}

impl KnowledgeBaseTool {
    pub fn new(project: &str, retriever: Arc<dyn Retriever>, k: usize, sources: SourceCollector) -> Self {
        Self {
            project: project.to_string(),
            retriever,
            k,
            sources,
        }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(KNOWLEDGE_BASE_TOOL, KNOWLEDGE_BASE_DESCRIPTION, query_parameters())
    }

    async fn call(&self, input: &str) -> Result<String, ChainError> {
        let hits = self.retriever.search(&self.project, input, self.k).await?;
        if hits.is_empty() {
            return Ok(NO_KNOWLEDGE_FOUND.to_string());
        }
        let context = join_contents(&hits);
        self.sources.extend(hits);
        Ok(format!("Context found from knowledge base:\n{}", context))
    }
}

/// A retrieval-type agent exposed under its own name.
pub struct ProjectRetrievalTool {
    name: String,
    description: String,
    inner: KnowledgeBaseTool,
}

impl ProjectRetrievalTool {
    pub fn new(
        agent_name: &str,
        description: &str,
        project: &str,
        retriever: Arc<dyn Retriever>,
        k: usize,
        sources: SourceCollector,
    ) -> Self {
        let compact: String = agent_name.chars().filter(|c| !c.is_whitespace()).collect();
        Self {
            name: sanitize_tool_name(&compact),
            description: format!("{} Input should be a search query.", description.trim()),
            inner: KnowledgeBaseTool::new(project, retriever, k, sources),
        }
    }
}

#[async_trait]
impl Tool for ProjectRetrievalTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(&self.name, &self.description, query_parameters())
    }

    async fn call(&self, input: &str) -> Result<String, ChainError> {
        let hits = self
            .inner
            .retriever
            .search(&self.inner.project, input, self.inner.k)
            .await?;
        if hits.is_empty() {
            return Ok("No relevant documents found.".to_string());
        }
        let context = join_contents(&hits);
        self.inner.sources.extend(hits);
        Ok(format!("Context found:\n{}", context))
    }
}

/// A loaded agent whose `run` is the tool body.
pub struct AgentTool {
    name: String,
    description: String,
    agent: Box<dyn Agent>,
}

impl AgentTool {
    /// `name` is usually the implementation name; `description` falls back to
    /// a generic line naming the agent.
    pub fn new(name: &str, description: Option<&str>, agent: Box<dyn Agent>) -> Self {
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .unwrap_or_else(|| {
                format!(
                    "Custom agent tool. Use this to perform actions related to {}.",
                    agent.name()
                )
            });
        Self {
            name: sanitize_tool_name(name),
            description,
            agent,
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(&self.name, &self.description, query_parameters())
    }

    async fn call(&self, input: &str) -> Result<String, ChainError> {
        self.agent.run(input).await
    }
}

struct Entry {
    definition: ToolDefinition,
    tool: Box<dyn Tool>,
}

/// Name-addressed tool set handed to the fallback loop.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

/// Builder; registration order is the order tools are offered to the model.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<Entry>,
    taken: HashSet<String>,
}

impl ToolRegistryBuilder {
    /// Register a tool. A name already taken gets a numeric suffix.
    #[must_use]
    pub fn register(mut self, tool: Box<dyn Tool>) -> Self {
        let mut definition = tool.definition();
        let base = definition.function.name.clone();
        let mut name = base.clone();
        let mut n = 2;
        while self.taken.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        if name != base {
            tracing::debug!(tool = %base, renamed = %name, "duplicate tool name");
        }
        definition.function.name = name.clone();
        self.taken.insert(name);
        self.entries.push(Entry { definition, tool });
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            entries: self.entries,
        }
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.definition.function.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch a tool call. Failures come back as error results for the model
    /// to see, never as a loop error.
    pub async fn call(&self, tool_call_id: &str, name: &str, arguments: &str) -> ToolResult {
        let Some(entry) = self.entries.iter().find(|e| e.definition.function.name == name) else {
            return ToolResult {
                tool_call_id: tool_call_id.to_string(),
                tool_name: name.to_string(),
                content: format!("Unknown tool: {}", name),
                is_error: true,
            };
        };
        let input = tool_input(arguments);
        match entry.tool.call(&input).await {
            Ok(content) => ToolResult {
                tool_call_id: tool_call_id.to_string(),
                tool_name: name.to_string(),
                content,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                ToolResult {
                    tool_call_id: tool_call_id.to_string(),
                    tool_name: name.to_string(),
                    content: format!("Error: {}", e),
                    is_error: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::UppercaseAgent;
    use crate::retrieval::RetrievalAnswer;
    use chainlite_core::model::Snippet;
    use std::path::Path;

    struct Corpus(Vec<&'static str>);

    #[async_trait]
    impl Retriever for Corpus {
        async fn query(&self, _p: &str, _t: &str) -> Result<RetrievalAnswer, ChainError> {
            Ok(RetrievalAnswer::default())
        }
        async fn search(&self, _p: &str, text: &str, k: usize) -> Result<Vec<Snippet>, ChainError> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .filter(|(_, c)| text.split_whitespace().any(|w| c.contains(w)))
                .take(k)
                .map(|(i, c)| Snippet {
                    content: c.to_string(),
                    source: "doc.txt".into(),
                    chunk_index: i,
                    score: 1.0,
                })
                .collect())
        }
        async fn ingest(&self, _p: &str, _f: &Path, _n: &str) -> Result<usize, ChainError> {
            Ok(0)
        }
    }

    #[test]
    fn test_tool_input_shapes() {
        assert_eq!(tool_input(r#"{"query":"total"}"#), "total");
        assert_eq!(tool_input(r#"{"text":"raw"}"#), "raw");
        assert_eq!(tool_input(r#""quoted""#), "quoted");
        assert_eq!(tool_input("not json"), "not json");
    }

    #[tokio::test]
    async fn test_knowledge_base_tool_reports_sources() {
        let sources = SourceCollector::with_cap(5);
        let kb = KnowledgeBaseTool::new(
            "p",
            Arc::new(Corpus(vec!["invoice total is 42", "shipping address"])),
            5,
            sources.clone(),
        );
        assert_eq!(
            kb.call("total").await.unwrap(),
            "Context found from knowledge base:\ninvoice total is 42"
        );
        assert_eq!(kb.call("zebra").await.unwrap(), NO_KNOWLEDGE_FOUND);
        assert_eq!(sources.len(), 1);
    }

    #[tokio::test]
    async fn test_project_retrieval_tool_naming() {
        let tool = ProjectRetrievalTool::new(
            "Contract Docs",
            "Searches contracts.",
            "p",
            Arc::new(Corpus(vec![])),
            5,
            SourceCollector::new(),
        );
        let def = tool.definition();
        assert_eq!(def.function.name, "ContractDocs");
        assert_eq!(def.function.description, "Searches contracts. Input should be a search query.");
        assert_eq!(tool.call("x").await.unwrap(), "No relevant documents found.");
    }

    #[tokio::test]
    async fn test_registry_dedup_and_dispatch() {
        let registry = ToolRegistry::builder()
            .register(Box::new(AgentTool::new(
                "UppercaseAgent",
                None,
                Box::new(UppercaseAgent::new("Shout")),
            )))
            .register(Box::new(AgentTool::new(
                "UppercaseAgent",
                Some("Second copy"),
                Box::new(UppercaseAgent::new("Shout2")),
            )))
            .build();
        assert_eq!(registry.names(), vec!["UppercaseAgent", "UppercaseAgent_2"]);
        assert!(registry.definitions()[0]
            .function
            .description
            .contains("related to Shout"));

        let ok = registry.call("c1", "UppercaseAgent_2", r#"{"query":"hi"}"#).await;
        assert_eq!(ok.content, "HI");
        assert!(!ok.is_error);

        let missing = registry.call("c2", "Nope", "{}").await;
        assert!(missing.is_error);
        assert_eq!(missing.content, "Unknown tool: Nope");
    }
}
