//! Request-level orchestration: access check → resolve → chain or fallback →
//! session record.

use chainlite_core::config::{OrchestratorConfig, RetrievalConfig};
use chainlite_core::model::{ChatSession, ChatTurn, ExecutionChain, Project};
use chainlite_core::protocol::{ChatMode, ChatRequest, ChatResponse, IngestRequest};
use chainlite_core::ChainError;
use chainlite_executor::{DocumentStore, Registry, SessionRecorder};
use std::sync::Arc;

use crate::executor::{ChainExecutor, StepReport};
use crate::fallback::{FallbackAgent, FALLBACK_ERROR_ANSWER};
use crate::llm::ChatBackend;
use crate::loader::{AgentCatalog, AgentLoader};
use crate::resolver::{ChainResolver, Resolution};
use crate::retrieval::Retriever;
use crate::types::ChainEventSink;

/// A response plus what produced it, for callers that log or audit.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: ChatResponse,
    /// `Some` in chain mode.
    pub chain_used: Option<ExecutionChain>,
    /// Per-step results in chain mode; empty in fallback mode.
    pub steps: Vec<StepReport>,
    /// Tool calls made in fallback mode.
    pub tool_calls: usize,
}

pub struct ChatService {
    registry: Arc<dyn Registry>,
    resolver: ChainResolver,
    executor: ChainExecutor,
    loader: Arc<AgentLoader>,
    recorder: Arc<dyn SessionRecorder>,
    backend: Option<Arc<dyn ChatBackend>>,
    retrieval: RetrievalConfig,
    max_iterations: usize,
}

/// Wires the collaborators together.
pub struct ChatServiceBuilder {
    registry: Arc<dyn Registry>,
    documents: Arc<dyn DocumentStore>,
    retriever: Arc<dyn Retriever>,
    recorder: Arc<dyn SessionRecorder>,
    backend: Option<Arc<dyn ChatBackend>>,
    catalog: AgentCatalog,
    orchestrator: OrchestratorConfig,
    retrieval: RetrievalConfig,
}

impl ChatServiceBuilder {
    #[must_use]
    pub fn backend(mut self, backend: Option<Arc<dyn ChatBackend>>) -> Self {
        self.backend = backend;
        self
    }

    /// Replaces the default built-in catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: AgentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn orchestrator(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = config;
        self
    }

    #[must_use]
    pub fn retrieval(mut self, config: RetrievalConfig) -> Self {
        self.retrieval = config;
        self
    }

    pub fn build(self) -> ChatService {
        let loader = Arc::new(AgentLoader::new(
            self.catalog,
            self.retriever,
            self.backend.clone(),
        ));
        let executor = ChainExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&loader),
            self.documents,
            self.orchestrator.step_failure,
        );
        let max_iterations = self.orchestrator.max_iterations;
        ChatService {
            resolver: ChainResolver::new(Arc::clone(&self.registry), self.orchestrator),
            registry: self.registry,
            executor,
            loader,
            recorder: self.recorder,
            backend: self.backend,
            retrieval: self.retrieval,
            max_iterations,
        }
    }
}

impl ChatService {
    pub fn builder(
        registry: Arc<dyn Registry>,
        documents: Arc<dyn DocumentStore>,
        retriever: Arc<dyn Retriever>,
        recorder: Arc<dyn SessionRecorder>,
    ) -> ChatServiceBuilder {
        ChatServiceBuilder {
            registry,
            documents,
            retriever,
            recorder,
            backend: None,
            catalog: AgentCatalog::with_builtins(),
            orchestrator: OrchestratorConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn loader(&self) -> &Arc<AgentLoader> {
        &self.loader
    }

    /// Answer one chat request and record the turn.
    pub async fn process_chat_request(
        &self,
        request: &ChatRequest,
        sink: &mut dyn ChainEventSink,
    ) -> Result<ChatResponse, ChainError> {
        Ok(self.run_chat(request, sink).await?.response)
    }

    /// Same as [`Self::process_chat_request`], keeping the execution details.
    pub async fn run_chat(
        &self,
        request: &ChatRequest,
        sink: &mut dyn ChainEventSink,
    ) -> Result<ChatOutcome, ChainError> {
        if request.query.trim().is_empty() {
            return Err(ChainError::InvalidRequest("query must not be empty".into()));
        }
        // Unknown project is NotFound regardless of who asks.
        self.project(&request.project)?;
        if !request.may_access_project() {
            return Err(ChainError::Forbidden(format!(
                "{} may not access project {}",
                request.requester, request.project
            )));
        }

        let resolved = self.resolver.resolve(request)?;
        let project = resolved.project;
        let mode = match resolved.resolution {
            Resolution::Chain { .. } => ChatMode::Chain,
            Resolution::NoChainConfigured => ChatMode::Fallback,
        };
        tracing::info!(project = %project.id, requester = %request.requester, %mode, "chat request");

        let outcome = match resolved.resolution {
            Resolution::Chain { chain, .. } => {
                let run = self
                    .executor
                    .execute(&project.id, &chain, &request.query, sink)
                    .await?;
                ChatOutcome {
                    response: ChatResponse {
                        answer: run.answer,
                        sources: run.sources,
                        mode: ChatMode::Chain,
                    },
                    chain_used: Some(chain),
                    steps: run.steps,
                    tool_calls: 0,
                }
            }
            Resolution::NoChainConfigured => self.fallback(&project, &request.query, sink).await?,
        };

        let user_turn = ChatTurn::user(&request.query);
        let assistant_turn = ChatTurn::assistant(
            &outcome.response.answer,
            outcome.response.sources.clone(),
        );
        if let Err(e) = self.recorder.append(
            &project.id,
            &request.requester,
            &user_turn,
            &assistant_turn,
            outcome.chain_used.as_ref(),
        ) {
            let detail = format!("{:#}", e);
            tracing::error!(project = %project.id, error = %detail, "failed to record chat turn");
        }
        Ok(outcome)
    }

    async fn fallback(
        &self,
        project: &Project,
        query: &str,
        sink: &mut dyn ChainEventSink,
    ) -> Result<ChatOutcome, ChainError> {
        let top_k = self.retrieval.top_k;
        let Some(backend) = &self.backend else {
            tracing::info!(project = %project.id, "no LLM configured; answering from the knowledge base");
            let mut result = self.loader.retriever().query(&project.id, query).await?;
            result.sources.truncate(top_k);
            return Ok(ChatOutcome {
                response: ChatResponse {
                    answer: result.answer,
                    sources: result.sources,
                    mode: ChatMode::Fallback,
                },
                chain_used: None,
                steps: Vec::new(),
                tool_calls: 0,
            });
        };

        let agent = FallbackAgent::for_project(
            project,
            self.registry.as_ref(),
            &self.loader,
            Arc::clone(backend),
            top_k,
            self.max_iterations,
        )
        .await?;
        let (answer, sources, tool_calls) = match agent.run(query, sink).await {
            Ok(run) => (run.answer, run.sources, run.tool_calls),
            Err(e) => {
                tracing::error!(project = %project.id, error = %e, "fallback agent failed");
                (FALLBACK_ERROR_ANSWER.to_string(), Vec::new(), 0)
            }
        };
        Ok(ChatOutcome {
            response: ChatResponse {
                answer,
                sources,
                mode: ChatMode::Fallback,
            },
            chain_used: None,
            steps: Vec::new(),
            tool_calls,
        })
    }

    /// Run one agent directly against `query`, with step semantics and no
    /// history. Unknown agent or project is `NotFound`.
    pub async fn chat_agent(
        &self,
        agent_id: &str,
        project: &str,
        query: &str,
        sink: &mut dyn ChainEventSink,
    ) -> Result<ChatResponse, ChainError> {
        self.project(project)?;
        if self
            .registry
            .agent(agent_id)
            .map_err(ChainError::storage)?
            .is_none()
        {
            return Err(ChainError::agent_not_found(agent_id));
        }
        let run = self
            .executor
            .execute(project, &ExecutionChain::from_agent_ids([agent_id]), query, sink)
            .await?;
        Ok(ChatResponse {
            answer: run.answer,
            sources: run.sources,
            mode: ChatMode::Chain,
        })
    }

    /// Store and index a document for a requester. Unknown project is
    /// `NotFound`; a requester without upload rights is `Forbidden`.
    pub async fn ingest(&self, request: &IngestRequest) -> Result<usize, ChainError> {
        let project = self.project(&request.project)?;
        if !request.may_upload_to(&project) {
            return Err(ChainError::Forbidden(format!(
                "{} may not upload files to project {}",
                request.requester, request.project
            )));
        }
        let chunks = self
            .loader
            .retriever()
            .ingest(&project.id, &request.file, &request.original_name)
            .await?;
        tracing::info!(project = %project.id, requester = %request.requester, document = %request.original_name, chunks, "document ingested");
        Ok(chunks)
    }

    fn project(&self, id: &str) -> Result<Project, ChainError> {
        self.registry
            .project(id)
            .map_err(ChainError::storage)?
            .ok_or_else(|| ChainError::project_not_found(id))
    }

    /// Recorded turns and last chain for (project, requester).
    pub fn history(&self, project: &str, requester: &str) -> Result<ChatSession, ChainError> {
        self.recorder
            .fetch_history(project, requester)
            .map_err(ChainError::storage)
    }
}
