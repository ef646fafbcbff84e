//! Tool-calling fallback: one LLM loop over the project's knowledge base and
//! registered agents, used when no chain is configured.

use chainlite_core::model::{AgentKind, Project};
use chainlite_core::ChainError;
use chainlite_executor::Registry;
use std::sync::Arc;

use crate::capability::SourceCollector;
use crate::llm::ChatBackend;
use crate::loader::AgentLoader;
use crate::tools::{AgentTool, KnowledgeBaseTool, ProjectRetrievalTool, ToolRegistry};
use crate::types::{safe_truncate, ChainEventSink, ChatMessage};

/// Answer returned when the loop fails at request level.
pub const FALLBACK_ERROR_ANSWER: &str = "I encountered an error while processing your request.";

pub const SYSTEM_PROMPT: &str = "You are an intelligent project assistant with access to a \
KnowledgeBase and specialized Agents (Tools). Your goal is to fulfill the user's request, which \
may require using multiple tools in a sequence.

GUIDELINES:
1. Analyze the request to see if it requires multiple steps (e.g., 'Translate X then convert to Y').
2. If multiple steps are needed: Call Tool 1 -> Get Output -> Call Tool 2 with Tool 1's output -> ... -> Final Result.
3. Do NOT stop after the first tool if the second part of the request hasn't been done yet.
4. If the user asks a question about documents, use the KnowledgeBase.
5. IMPORTANT: Once the full request is complete, your final answer MUST be the exact output of the final tool used. Do NOT add conversational filler.
6. Do NOT call the KnowledgeBase to verify the result of another tool.";

/// Loop counters.
#[derive(Debug, Default)]
struct ExecutionState {
    iterations: usize,
    total_tool_calls: usize,
    failed_tool_calls: usize,
    last_tool_output: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackRun {
    pub answer: String,
    pub sources: Vec<chainlite_core::model::Snippet>,
    pub tool_calls: usize,
    pub iterations: usize,
}

pub struct FallbackAgent {
    backend: Arc<dyn ChatBackend>,
    tools: ToolRegistry,
    sources: SourceCollector,
    max_iterations: usize,
}

impl FallbackAgent {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tools: ToolRegistry,
        sources: SourceCollector,
        max_iterations: usize,
    ) -> Self {
        Self {
            backend,
            tools,
            sources,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Tools for `project`: the knowledge base plus one per registered agent.
    /// Agents that fail to load are logged and left out.
    pub async fn for_project(
        project: &Project,
        registry: &dyn Registry,
        loader: &AgentLoader,
        backend: Arc<dyn ChatBackend>,
        top_k: usize,
        max_iterations: usize,
    ) -> Result<Self, ChainError> {
        let sources = SourceCollector::with_cap(top_k);
        let retriever = Arc::clone(loader.retriever());
        let mut builder = ToolRegistry::builder().register(Box::new(KnowledgeBaseTool::new(
            &project.id,
            Arc::clone(&retriever),
            top_k,
            sources.clone(),
        )));

        for agent_id in &project.agents {
            let Some(descriptor) = registry.agent(agent_id).map_err(ChainError::storage)? else {
                tracing::warn!(project = %project.id, agent = %agent_id, "registered agent not found; tool omitted");
                continue;
            };
            if descriptor.kind() == AgentKind::Rag {
                builder = builder.register(Box::new(ProjectRetrievalTool::new(
                    &descriptor.name,
                    descriptor.description_or_name(),
                    &project.id,
                    Arc::clone(&retriever),
                    top_k,
                    sources.clone(),
                )));
                continue;
            }
            match loader.load(&descriptor, &project.id, &sources).await {
                Ok(loaded) => {
                    builder = builder.register(Box::new(AgentTool::new(
                        &loaded.implementation,
                        descriptor.description.as_deref(),
                        loaded.agent,
                    )));
                }
                Err(e) => {
                    tracing::warn!(project = %project.id, agent = %descriptor.name, error = %e, "agent tool omitted");
                }
            }
        }

        let tools = builder.build();
        tracing::debug!(project = %project.id, tools = ?tools.names(), "fallback tools ready");
        Ok(Self::new(backend, tools, sources, max_iterations))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop. The answer is the model's final text, or the last tool
    /// output when the model ends without text. LLM failures are `Llm` errors.
    pub async fn run(
        &self,
        query: &str,
        sink: &mut dyn ChainEventSink,
    ) -> Result<FallbackRun, ChainError> {
        let definitions = self.tools.definitions();
        let tools_ref = if definitions.is_empty() {
            None
        } else {
            Some(definitions.as_slice())
        };

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)];
        let mut state = ExecutionState::default();
        let mut final_text: Option<String> = None;

        loop {
            if state.iterations >= self.max_iterations {
                tracing::warn!("fallback loop reached max iterations ({})", self.max_iterations);
                break;
            }
            state.iterations += 1;

            let reply = self
                .backend
                .complete(&messages, tools_ref)
                .await
                .map_err(|e| ChainError::Llm(format!("{:#}", e)))?;

            if reply.tool_calls.is_empty() {
                if let Some(text) = reply.content.as_deref() {
                    sink.on_text(text);
                    messages.push(ChatMessage::assistant(text));
                }
                final_text = reply.content;
                break;
            }

            messages.push(ChatMessage::assistant_with_tool_calls(
                reply.content.as_deref(),
                reply.tool_calls.clone(),
            ));
            for call in &reply.tool_calls {
                sink.on_tool_call(&call.function.name, &call.function.arguments);
                let result = self
                    .tools
                    .call(&call.id, &call.function.name, &call.function.arguments)
                    .await;
                state.total_tool_calls += 1;
                tracing::debug!(
                    tool = %result.tool_name,
                    is_error = result.is_error,
                    output = safe_truncate(&result.content, 200),
                    "tool call finished"
                );
                sink.on_tool_result(&result.tool_name, &result.content, result.is_error);
                messages.push(ChatMessage::tool_result(&result.tool_call_id, &result.content));
                if result.is_error {
                    state.failed_tool_calls += 1;
                } else {
                    state.last_tool_output = Some(result.content);
                }
            }
        }

        let answer = final_text
            .filter(|t| !t.trim().is_empty())
            .or(state.last_tool_output)
            .ok_or_else(|| ChainError::Llm("model returned no answer".to_string()))?;

        tracing::info!(
            iterations = state.iterations,
            tool_calls = state.total_tool_calls,
            failed = state.failed_tool_calls,
            "fallback loop finished"
        );
        Ok(FallbackRun {
            answer: answer.trim().to_string(),
            sources: self.sources.snapshot(),
            tool_calls: state.total_tool_calls,
            iterations: state.iterations,
        })
    }
}
