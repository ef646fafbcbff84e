//! chainlite-agent: the chain orchestration engine.
//!
//! - `capability`: the `Agent` contract and the snippet side channel
//! - `loader` / `plugins` / `script`: descriptor → runnable agent
//! - `resolver`: which chain runs for a request
//! - `executor`: sequential step execution with failure isolation
//! - `tools` / `fallback`: LLM tool-calling loop when no chain is configured
//! - `retrieval`: project-scoped search, answer generation, ingestion
//! - `llm`: OpenAI-compatible and Claude chat clients
//! - `service`: `ChatService`, the request-level entry point

pub mod capability;
pub mod executor;
pub mod fallback;
pub mod llm;
pub mod loader;
pub mod plugins;
pub mod resolver;
pub mod retrieval;
pub mod script;
pub mod service;
pub mod tools;
pub mod types;

pub use capability::{Agent, SourceCollector};
pub use executor::{ChainExecutor, ChainRun, StepOutcome, StepReport};
pub use fallback::FallbackAgent;
pub use llm::{AssistantReply, ChatBackend, LlmClient};
pub use loader::{AgentCatalog, AgentInit, AgentLoader, LoadedAgent};
pub use resolver::{ChainResolver, Resolution};
pub use retrieval::{RagService, RetrievalAnswer, Retriever};
pub use service::{ChatOutcome, ChatService};
pub use types::{ChainEventSink, RecordingSink, SilentSink};
