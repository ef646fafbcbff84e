//! Chain executor: runs resolved steps in order, threading one running input.
//!
//! Each step gets `current input + context prefix`, where the prefix carries
//! the step's inline context and the text of its referenced files. A step
//! whose agent fails yields a diagnostic naming the agent; under
//! [`StepFailurePolicy::Continue`] that diagnostic becomes the next input, under
//! `Abort` it ends the chain as the answer.

use chainlite_core::config::StepFailurePolicy;
use chainlite_core::model::{AgentDescriptor, AgentKind, ChainStep, ExecutionChain, Snippet};
use chainlite_core::ChainError;
use chainlite_executor::documents::extract_text;
use chainlite_executor::{DocumentStore, Registry};
use std::sync::Arc;

use crate::capability::SourceCollector;
use crate::loader::AgentLoader;
use crate::types::ChainEventSink;

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed(String),
    /// Diagnostic text naming the failing agent.
    Failed(String),
    /// Agent id did not resolve; input passed through unchanged.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ChainRun {
    pub answer: String,
    /// Snippets from retrieval steps, deduplicated, in arrival order.
    pub sources: Vec<Snippet>,
    pub steps: Vec<StepReport>,
}

impl ChainRun {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    /// Ids of the agents that actually ran (completed or failed).
    pub fn executed_agents(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !matches!(s.outcome, StepOutcome::Skipped))
            .map(|s| s.agent_id.as_str())
            .collect()
    }
}

/// The diagnostic that replaces a failed step's output.
pub fn step_diagnostic(agent_name: &str, err: &ChainError) -> String {
    format!("Error executing agent {}: {}", agent_name, err)
}

pub struct ChainExecutor {
    registry: Arc<dyn Registry>,
    loader: Arc<AgentLoader>,
    documents: Arc<dyn DocumentStore>,
    step_failure: StepFailurePolicy,
}

impl ChainExecutor {
    pub fn new(
        registry: Arc<dyn Registry>,
        loader: Arc<AgentLoader>,
        documents: Arc<dyn DocumentStore>,
        step_failure: StepFailurePolicy,
    ) -> Self {
        Self {
            registry,
            loader,
            documents,
            step_failure,
        }
    }

    /// Run `chain` for `project` starting from `query`.
    ///
    /// Only registry failures abort; every agent-level error is recovered at
    /// the step boundary.
    pub async fn execute(
        &self,
        project: &str,
        chain: &ExecutionChain,
        query: &str,
        sink: &mut dyn ChainEventSink,
    ) -> Result<ChainRun, ChainError> {
        let sources = SourceCollector::new();
        let mut current = query.to_string();
        let mut reports = Vec::with_capacity(chain.len());

        for (index, step) in chain.steps.iter().enumerate() {
            let Some(descriptor) = self
                .registry
                .agent(&step.agent_id)
                .map_err(ChainError::storage)?
            else {
                tracing::warn!(project, step = index, agent = %step.agent_id, "unknown agent; step skipped");
                sink.on_step_skipped(index, &step.agent_id);
                reports.push(StepReport {
                    index,
                    agent_id: step.agent_id.clone(),
                    agent_name: None,
                    outcome: StepOutcome::Skipped,
                });
                continue;
            };

            sink.on_step_start(index, &descriptor.name);
            let prefix = self.context_prefix(project, step).await;
            let input = step_input(&descriptor, &current, &prefix);

            let outcome = match self.run_step(&descriptor, project, &input, &sources).await {
                Ok(output) => {
                    tracing::debug!(project, step = index, agent = %descriptor.name, "step completed");
                    sink.on_step_finish(index, &descriptor.name, &output, false);
                    current = output.clone();
                    StepOutcome::Completed(output)
                }
                Err(err) => {
                    if err.is_step_level() {
                        tracing::warn!(project, step = index, agent = %descriptor.name, error = %err, "step failed");
                    } else {
                        tracing::error!(project, step = index, agent = %descriptor.name, error = %err, "step failed");
                    }
                    let diagnostic = step_diagnostic(&descriptor.name, &err);
                    sink.on_step_finish(index, &descriptor.name, &diagnostic, true);
                    current = diagnostic.clone();
                    StepOutcome::Failed(diagnostic)
                }
            };

            let failed = matches!(outcome, StepOutcome::Failed(_));
            reports.push(StepReport {
                index,
                agent_id: descriptor.id.clone(),
                agent_name: Some(descriptor.name.clone()),
                outcome,
            });
            if failed && self.step_failure == StepFailurePolicy::Abort {
                tracing::info!(project, step = index, "chain aborted after failed step");
                break;
            }
        }

        Ok(ChainRun {
            answer: current,
            sources: sources.snapshot(),
            steps: reports,
        })
    }

    async fn run_step(
        &self,
        descriptor: &AgentDescriptor,
        project: &str,
        input: &str,
        sources: &SourceCollector,
    ) -> Result<String, ChainError> {
        let loaded = self.loader.load(descriptor, project, sources).await?;
        tracing::debug!(agent = %descriptor.name, implementation = %loaded.implementation, "running step");
        loaded.agent.run(input).await
    }

    /// Inline context plus referenced file contents. When none of the files
    /// can be read, their names are listed as unresolved instead.
    pub async fn context_prefix(&self, project: &str, step: &ChainStep) -> String {
        let mut prefix = String::new();
        if let Some(context) = step.context.as_deref().filter(|c| !c.is_empty()) {
            prefix.push_str(&format!("\nContext: {}\n", context));
        }
        if step.files.is_empty() {
            return prefix;
        }

        let documents = Arc::clone(&self.documents);
        let project_id = project.to_string();
        let files = step.files.clone();
        let file_context = tokio::task::spawn_blocking(move || read_files(&*documents, &project_id, &files))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "file context task failed");
                String::new()
            });

        if file_context.is_empty() {
            prefix.push_str(&format!(
                "\nReferenced Files: {} (Could not read content)\n",
                step.files.join(", ")
            ));
        } else {
            prefix.push_str(&format!("\nFile Contents:\n{}\n", file_context));
        }
        prefix
    }
}

fn read_files(documents: &dyn DocumentStore, project: &str, files: &[String]) -> String {
    let mut out = String::new();
    for name in files {
        let bytes = match documents.read(project, name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(project, file = %name, error = %e, "cannot read referenced file");
                continue;
            }
        };
        match extract_text(name, &bytes) {
            Ok(content) => out.push_str(&format!("\n--- Content of {} ---\n{}\n", name, content)),
            Err(e) => tracing::warn!(project, file = %name, error = %e, "cannot extract referenced file"),
        }
    }
    out
}

/// Retrieval steps get the prefix as a separate clause of the query; other
/// agents get it appended verbatim.
fn step_input(descriptor: &AgentDescriptor, current: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return current.to_string();
    }
    match descriptor.kind() {
        AgentKind::Rag => format!("{} {}", current, prefix),
        AgentKind::Code => format!("{}{}", current, prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Agent;
    use crate::loader::AgentCatalog;
    use crate::retrieval::{RetrievalAnswer, Retriever};
    use crate::types::RecordingSink;
    use async_trait::async_trait;
    use chainlite_executor::{FsDocumentStore, JsonRegistry, NewAgent};
    use std::path::Path;

    struct StaticRetriever;

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn query(&self, _p: &str, text: &str) -> Result<RetrievalAnswer, ChainError> {
            Ok(RetrievalAnswer {
                answer: format!("docs say: {}", text),
                sources: vec![Snippet {
                    content: "invoice total is 42".into(),
                    source: "invoice.txt".into(),
                    chunk_index: 0,
                    score: 1.0,
                }],
            })
        }
        async fn search(&self, _p: &str, _t: &str, _k: usize) -> Result<Vec<Snippet>, ChainError> {
            Ok(Vec::new())
        }
        async fn ingest(&self, _p: &str, _f: &Path, _n: &str) -> Result<usize, ChainError> {
            Ok(0)
        }
    }

    struct Exploding(String);

    #[async_trait]
    impl Agent for Exploding {
        fn name(&self) -> &str {
            &self.0
        }
        async fn run(&self, _input: &str) -> Result<String, ChainError> {
            Err(ChainError::Execution("translator unavailable".into()))
        }
    }

    struct Harness {
        registry: Arc<JsonRegistry>,
        executor: ChainExecutor,
        _dir: tempfile::TempDir,
        docs: Arc<FsDocumentStore>,
    }

    fn harness(policy: StepFailurePolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(JsonRegistry::in_memory());
        let docs = Arc::new(FsDocumentStore::new(dir.path().join("documents")));
        let catalog = AgentCatalog::with_builtins().register("test:broken", "TranslateToHindiAgent", |i| {
            Ok(Box::new(Exploding(i.name.to_string())))
        });
        let loader = Arc::new(AgentLoader::new(catalog, Arc::new(StaticRetriever), None));
        let executor = ChainExecutor::new(registry.clone(), loader, docs.clone(), policy);
        Harness {
            registry,
            executor,
            _dir: dir,
            docs,
        }
    }

    fn add(h: &Harness, name: &str, agent_type: &str, location: Option<&str>) -> String {
        h.registry
            .register_agent(NewAgent {
                name: name.into(),
                agent_type: agent_type.into(),
                code_location: location.map(String::from),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_echo_then_uppercase() {
        let h = harness(StepFailurePolicy::Continue);
        let echo = add(&h, "Echo", "code", Some("builtin:utilities"));
        let upper = add(&h, "Uppercase", "code", Some("builtin:utilities"));
        let mut sink = RecordingSink::default();

        let run = h
            .executor
            .execute("p", &ExecutionChain::from_agent_ids([&echo, &upper]), "hello", &mut sink)
            .await
            .unwrap();
        assert_eq!(run.answer, "HELLO");
        assert!(run.sources.is_empty());
        assert_eq!(run.steps[0].outcome, StepOutcome::Completed("hello".into()));
        assert_eq!(
            sink.events,
            vec!["step_start:0:Echo", "step_done:0:Echo", "step_start:1:Uppercase", "step_done:1:Uppercase"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_chain_continues() {
        let h = harness(StepFailurePolicy::Continue);
        let broken = add(&h, "TranslateToHindi", "code", Some("test:broken"));
        let upper = add(&h, "Uppercase", "code", Some("builtin:utilities"));

        let run = h
            .executor
            .execute("p", &ExecutionChain::from_agent_ids([&broken, &upper]), "hello", &mut crate::types::SilentSink)
            .await
            .unwrap();
        assert!(matches!(&run.steps[0].outcome, StepOutcome::Failed(d) if d.contains("TranslateToHindi")));
        assert_eq!(
            run.answer,
            "ERROR EXECUTING AGENT TRANSLATETOHINDI: TRANSLATOR UNAVAILABLE"
        );
        assert_eq!(run.failed_steps().count(), 1);
        assert_eq!(run.executed_agents().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_failure() {
        let h = harness(StepFailurePolicy::Abort);
        let broken = add(&h, "TranslateToHindi", "code", Some("test:broken"));
        let upper = add(&h, "Uppercase", "code", Some("builtin:utilities"));

        let run = h
            .executor
            .execute("p", &ExecutionChain::from_agent_ids([&broken, &upper]), "hello", &mut crate::types::SilentSink)
            .await
            .unwrap();
        assert_eq!(run.steps.len(), 1);
        assert_eq!(
            run.answer,
            "Error executing agent TranslateToHindi: translator unavailable"
        );
    }

    #[tokio::test]
    async fn test_unknown_agent_skipped_and_missing_location_diagnosed() {
        let h = harness(StepFailurePolicy::Continue);
        let nowhere = add(&h, "Nowhere", "code", None);
        let echo = add(&h, "Echo", "code", Some("builtin:utilities"));
        let mut sink = RecordingSink::default();

        let run = h
            .executor
            .execute("p", &ExecutionChain::from_agent_ids(["ghost", echo.as_str()]), "hi", &mut sink)
            .await
            .unwrap();
        assert_eq!(run.answer, "hi");
        assert_eq!(run.steps[0].outcome, StepOutcome::Skipped);
        assert_eq!(sink.events[0], "step_skipped:0:ghost");

        let run = h
            .executor
            .execute("p", &ExecutionChain::from_agent_ids([&nowhere]), "hi", &mut sink)
            .await
            .unwrap();
        assert_eq!(
            run.answer,
            "Error executing agent Nowhere: Configuration error: Agent Nowhere has no code location"
        );
    }

    #[tokio::test]
    async fn test_context_and_files_reach_the_agent() {
        let h = harness(StepFailurePolicy::Continue);
        let echo = add(&h, "Echo", "code", Some("builtin:utilities"));
        h.docs.write("p", "notes.txt", b"alpha\0beta").unwrap();

        let step = ChainStep::new(&echo)
            .with_context("be brief")
            .with_files(["notes.txt", "missing.txt"]);
        let run = h
            .executor
            .execute("p", &ExecutionChain::new(vec![step]), "q", &mut crate::types::SilentSink)
            .await
            .unwrap();
        assert_eq!(
            run.answer,
            "q\nContext: be brief\n\nFile Contents:\n\n--- Content of notes.txt ---\nalphabeta\n\n"
        );

        let step = ChainStep::new(&echo).with_files(["missing.txt"]);
        let run = h
            .executor
            .execute("p", &ExecutionChain::new(vec![step]), "q", &mut crate::types::SilentSink)
            .await
            .unwrap();
        assert_eq!(run.answer, "q\nReferenced Files: missing.txt (Could not read content)\n");
    }

    #[tokio::test]
    async fn test_retrieval_step_collects_sources() {
        let h = harness(StepFailurePolicy::Continue);
        let docs = add(&h, "Docs", "rag", None);
        let upper = add(&h, "Uppercase", "code", Some("builtin:utilities"));
        let chain = ExecutionChain::new(vec![
            ChainStep::new(&docs).with_context("invoices"),
            ChainStep::new(&upper),
        ]);

        let run = h
            .executor
            .execute("p", &chain, "total?", &mut crate::types::SilentSink)
            .await
            .unwrap();
        assert_eq!(run.answer, "DOCS SAY: TOTAL? \nCONTEXT: INVOICES\n");
        assert_eq!(run.sources.len(), 1);
        assert_eq!(run.sources[0].source, "invoice.txt");
    }
}
