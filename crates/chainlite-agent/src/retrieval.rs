//! Retrieval collaborator: project-scoped search, answer generation and ingestion.

use async_trait::async_trait;
use chainlite_core::config::RetrievalConfig;
use chainlite_core::model::Snippet;
use chainlite_core::ChainError;
use chainlite_executor::documents::{extract_text, DocumentFormat};
use chainlite_executor::{DocumentStore, SnippetIndex};
use std::path::Path;
use std::sync::Arc;

use crate::capability::{Agent, SourceCollector};
use crate::llm::ChatBackend;
use crate::types::ChatMessage;

pub const NO_KNOWLEDGE_FOUND: &str = "No relevant information found in the knowledge base.";

const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// Answer plus the snippets it was grounded on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalAnswer {
    pub answer: String,
    pub sources: Vec<Snippet>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve and answer from the project's corpus.
    async fn query(&self, project: &str, text: &str) -> Result<RetrievalAnswer, ChainError>;

    /// Raw top-`k` snippets, no generation.
    async fn search(&self, project: &str, text: &str, k: usize)
        -> Result<Vec<Snippet>, ChainError>;

    /// Store and index a file under `original_name`. Returns the chunk count.
    async fn ingest(
        &self,
        project: &str,
        file: &Path,
        original_name: &str,
    ) -> Result<usize, ChainError>;
}

/// FTS5 index + document store + optional LLM for generation.
pub struct RagService {
    index: Arc<SnippetIndex>,
    documents: Arc<dyn DocumentStore>,
    backend: Option<Arc<dyn ChatBackend>>,
    config: RetrievalConfig,
}

impl RagService {
    pub fn new(
        index: Arc<SnippetIndex>,
        documents: Arc<dyn DocumentStore>,
        backend: Option<Arc<dyn ChatBackend>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            documents,
            backend,
            config,
        }
    }

    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    async fn generate(&self, text: &str, snippets: &[Snippet]) -> Result<String, ChainError> {
        let context = join_contents(snippets);
        let Some(backend) = &self.backend else {
            // No LLM configured: the retrieved context is the answer.
            return Ok(format!("Context found from knowledge base:\n{}", context));
        };
        let system = format!("{}\n\n{}", ANSWER_SYSTEM_PROMPT, context);
        let reply = backend
            .complete(&[ChatMessage::system(&system), ChatMessage::user(text)], None)
            .await
            .map_err(|e| ChainError::Llm(format!("{:#}", e)))?;
        Ok(reply.content.unwrap_or_default())
    }
}

/// Snippet contents joined by newlines, the form tools and prompts consume.
pub fn join_contents(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Retriever for RagService {
    async fn query(&self, project: &str, text: &str) -> Result<RetrievalAnswer, ChainError> {
        let sources = self.search(project, text, self.config.top_k).await?;
        if sources.is_empty() {
            return Ok(RetrievalAnswer {
                answer: NO_KNOWLEDGE_FOUND.to_string(),
                sources,
            });
        }
        let answer = self.generate(text, &sources).await?;
        Ok(RetrievalAnswer { answer, sources })
    }

    async fn search(
        &self,
        project: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<Snippet>, ChainError> {
        self.index
            .search(project, text, k)
            .map_err(ChainError::storage)
    }

    async fn ingest(
        &self,
        project: &str,
        file: &Path,
        original_name: &str,
    ) -> Result<usize, ChainError> {
        if DocumentFormat::from_name(original_name).is_none() {
            return Err(ChainError::InvalidRequest(format!(
                "Unsupported file type: {}",
                original_name
            )));
        }
        let bytes = tokio::fs::read(file).await.map_err(|e| {
            ChainError::InvalidRequest(format!("Cannot read {}: {}", file.display(), e))
        })?;

        let index = Arc::clone(&self.index);
        let documents = Arc::clone(&self.documents);
        let project = project.to_string();
        let name = original_name.to_string();
        let config = self.config;
        // PDF extraction and indexing are blocking work.
        let chunks = tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let text = extract_text(&name, &bytes)?;
            documents.write(&project, &name, &bytes)?;
            index.index_document(&project, &name, &text, config.chunk_size, config.chunk_overlap)
        })
        .await
        .map_err(|e| ChainError::Storage(format!("ingest task failed: {}", e)))?
        .map_err(ChainError::storage)?;

        tracing::info!(file = original_name, chunks, "document ingested");
        Ok(chunks)
    }
}

/// Retrieval exposed through the agent contract: `run` queries the shared
/// retriever and reports the snippets through the collector.
pub struct RetrievalAgent {
    name: String,
    project: String,
    retriever: Arc<dyn Retriever>,
    sources: SourceCollector,
}

impl RetrievalAgent {
    pub fn new(
        name: &str,
        project: &str,
        retriever: Arc<dyn Retriever>,
        sources: SourceCollector,
    ) -> Self {
        Self {
            name: name.to_string(),
            project: project.to_string(),
            retriever,
            sources,
        }
    }
}

#[async_trait]
impl Agent for RetrievalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        let result = self.retriever.query(&self.project, input).await?;
        self.sources.extend(result.sources);
        Ok(result.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::AssistantReply;
    use chainlite_executor::FsDocumentStore;
    use std::sync::Mutex;

    struct CannedBackend {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for CannedBackend {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[crate::types::ToolDefinition]>,
        ) -> anyhow::Result<AssistantReply> {
            let system = messages[0].content.clone().unwrap_or_default();
            self.seen.lock().unwrap().push(system);
            Ok(AssistantReply::text("The total is 42."))
        }
    }

    fn service(
        dir: &Path,
        backend: Option<Arc<dyn ChatBackend>>,
    ) -> RagService {
        RagService::new(
            Arc::new(SnippetIndex::in_memory().unwrap()),
            Arc::new(FsDocumentStore::new(dir.join("documents"))),
            backend,
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ingest_then_query_with_llm() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(CannedBackend {
            seen: Mutex::new(Vec::new()),
        });
        let rag = service(dir.path(), Some(backend.clone()));
        let file = dir.path().join("upload.tmp");
        std::fs::write(&file, "invoice   total\n\nis 42").unwrap();

        let chunks = rag.ingest("p1", &file, "invoice.txt").await.unwrap();
        assert_eq!(chunks, 1);
        assert!(dir.path().join("documents/p1/invoice.txt").is_file());

        let result = rag.query("p1", "what is the total?").await.unwrap();
        assert_eq!(result.answer, "The total is 42.");
        assert_eq!(result.sources.len(), 1);
        assert!(backend.seen.lock().unwrap()[0].contains("invoice total is 42"));
    }

    #[tokio::test]
    async fn test_query_without_hits_skips_llm() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(CannedBackend {
            seen: Mutex::new(Vec::new()),
        });
        let rag = service(dir.path(), Some(backend.clone()));
        let result = rag.query("p1", "anything").await.unwrap();
        assert_eq!(result.answer, NO_KNOWLEDGE_FOUND);
        assert!(result.sources.is_empty());
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_rejects_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let rag = service(dir.path(), None);
        let file = dir.path().join("x.csv");
        std::fs::write(&file, "a,b").unwrap();
        let err = rag.ingest("p1", &file, "x.csv").await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidRequest(_)));
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[tokio::test]
    async fn test_retrieval_agent_reports_sources() {
        let dir = tempfile::tempdir().unwrap();
        let rag = service(dir.path(), None);
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "invoice total is 42").unwrap();
        rag.ingest("p1", &file, "f.txt").await.unwrap();

        let sources = SourceCollector::new();
        let agent = RetrievalAgent::new("Docs", "p1", Arc::new(rag), sources.clone());
        let answer = agent.run("total").await.unwrap();
        assert!(answer.contains("42"));
        assert_eq!(sources.len(), 1);
        assert_eq!(agent.name(), "Docs");
    }
}
