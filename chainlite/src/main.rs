mod cli;
mod observability;
mod terminal;

use anyhow::{Context, Result};
use chainlite_agent::{AgentCatalog, ChatBackend, ChatService, LlmClient, RagService};
use chainlite_core::config::{
    init_llm_env, LlmConfig, OrchestratorConfig, PathsConfig, RetrievalConfig,
};
use chainlite_core::model::{ChainStep, ExecutionChain, TurnRole};
use chainlite_core::protocol::{ChatRequest, IngestRequest};
use chainlite_executor::{
    FsDocumentStore, JsonRegistry, JsonlSessionRecorder, NewAgent, Registry, SnippetIndex,
};
use clap::Parser;
use cli::{AgentAction, Cli, Commands, ProjectAction};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use terminal::TerminalSink;

/// Stores and services opened over one data directory.
struct Workspace {
    registry: Arc<JsonRegistry>,
    service: ChatService,
}

impl Workspace {
    fn open(paths: &PathsConfig, backend: Option<Arc<dyn ChatBackend>>) -> Result<Self> {
        std::fs::create_dir_all(&paths.data_dir).with_context(|| {
            format!("Failed to create data dir: {}", paths.data_dir.display())
        })?;
        let registry = Arc::new(JsonRegistry::open(&paths.registry_file())?);
        let documents = Arc::new(FsDocumentStore::new(paths.documents_dir()));
        let index = Arc::new(SnippetIndex::open(&paths.index_file())?);
        let retrieval = RetrievalConfig::from_env();
        let rag = Arc::new(RagService::new(
            index,
            documents.clone(),
            backend.clone(),
            retrieval,
        ));
        let recorder = Arc::new(JsonlSessionRecorder::new(paths.sessions_dir()));
        let service = ChatService::builder(registry.clone(), documents, rag, recorder)
            .backend(backend)
            .orchestrator(OrchestratorConfig::from_env())
            .retrieval(retrieval)
            .build();
        Ok(Self { registry, service })
    }
}

fn llm_backend() -> Result<Option<Arc<dyn ChatBackend>>> {
    let Some(config) = LlmConfig::try_from_env() else {
        tracing::debug!("no API key configured; fallback answers come from retrieval only");
        return Ok(None);
    };
    let client = LlmClient::from_config(&config)?;
    tracing::debug!(model = client.model(), "LLM client ready");
    Ok(Some(Arc::new(client)))
}

fn parse_config(raw: Option<&str>) -> Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => serde_json::from_str(raw).context("--config must be a JSON object"),
    }
}

fn parse_steps(raw: &str) -> Result<ExecutionChain> {
    let steps: Vec<ChainStep> =
        serde_json::from_str(raw).context("chain must be a JSON array of steps")?;
    Ok(ExecutionChain::new(steps))
}

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    // Before the runtime starts: no other threads exist yet.
    init_llm_env(
        cli.api_base.as_deref(),
        cli.api_key.as_deref(),
        cli.model.as_deref(),
    );
    let paths = cli
        .data_dir
        .map(PathsConfig::with_data_dir)
        .unwrap_or_else(PathsConfig::from_env);

    if let Commands::Catalog = cli.command {
        for (unit, implementations) in AgentCatalog::with_builtins().units() {
            println!("{}", unit);
            for name in implementations {
                println!("   - {}", name);
            }
        }
        return Ok(());
    }

    let workspace = Workspace::open(&paths, llm_backend()?)?;
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Commands::Chat {
            project,
            query,
            requester,
            admin,
            chain,
            chain_json,
            json,
        } => {
            let mut request = ChatRequest::new(&project, query, &requester);
            request = if admin {
                request.as_admin()
            } else {
                request.authorized_for([project.as_str()])
            };
            if let Some(raw) = chain_json {
                request = request.with_chain(parse_steps(&raw)?);
            } else if !chain.is_empty() {
                request = request.with_chain(ExecutionChain::from_agent_ids(chain));
            }

            let started = Instant::now();
            let mut sink = TerminalSink::new(!json);
            let outcome = rt.block_on(workspace.service.run_chat(&request, &mut sink))?;
            observability::audit_chat(
                &project,
                &requester,
                &outcome,
                started.elapsed().as_millis() as u64,
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.response)?);
            } else {
                println!("\n{}", outcome.response.answer);
                if !outcome.response.sources.is_empty() {
                    eprintln!("\n📚 Sources:");
                    for s in &outcome.response.sources {
                        eprintln!("   - {} (chunk {})", s.source, s.chunk_index);
                    }
                }
            }
        }
        Commands::RunAgent {
            agent,
            project,
            query,
        } => {
            let mut sink = TerminalSink::new(false);
            let response =
                rt.block_on(workspace.service.chat_agent(&agent, &project, &query, &mut sink))?;
            println!("{}", response.answer);
        }
        Commands::History {
            project,
            requester,
            json,
        } => {
            let session = workspace.service.history(&project, &requester)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                for turn in &session.turns {
                    let who = match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Assistant => "assistant",
                    };
                    println!("[{}] {}: {}", turn.timestamp.format("%Y-%m-%d %H:%M:%S"), who, turn.content);
                }
                match &session.last_chain {
                    Some(chain) => {
                        let ids: Vec<&str> =
                            chain.steps.iter().map(|s| s.agent_id.as_str()).collect();
                        println!("last chain: {}", ids.join(" → "));
                    }
                    None if !session.turns.is_empty() => println!("last chain: (fallback)"),
                    None => println!("No history."),
                }
            }
        }
        Commands::Ingest {
            project,
            file,
            name,
            requester,
            admin,
        } => {
            let path = Path::new(&file);
            let name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .with_context(|| format!("Cannot derive a document name from {}", file))?,
            };
            let mut request = IngestRequest::new(&project, &requester, path, &name);
            request = if admin {
                request.as_admin()
            } else {
                request.authorized_for([project.as_str()])
            };
            let chunks = rt.block_on(workspace.service.ingest(&request))?;
            observability::audit_ingest(&project, &name, chunks);
            println!("Indexed {} ({} chunks)", name, chunks);
        }
        Commands::Agent { action } => match action {
            AgentAction::Register {
                name,
                agent_type,
                description,
                location,
                config,
            } => {
                let agent = workspace.registry.register_agent(NewAgent {
                    name,
                    description,
                    agent_type,
                    config: parse_config(config.as_deref())?,
                    code_location: location,
                })?;
                println!("{}", agent.id);
            }
            AgentAction::List => {
                for agent in workspace.registry.agents()? {
                    println!(
                        "{}  {}  [{}]  {}",
                        agent.id,
                        agent.name,
                        agent.agent_type,
                        agent.code_location.as_deref().unwrap_or("-")
                    );
                }
            }
            AgentAction::SetConfig { agent, config } => {
                workspace
                    .registry
                    .set_agent_config(&agent, parse_config(Some(&config))?)?;
                println!("Updated {}", agent);
            }
        },
        Commands::Project { action } => match action {
            ProjectAction::Create {
                name,
                description,
                agents,
                allow_user_chaining,
            } => {
                let project = workspace.registry.create_project(
                    &name,
                    description,
                    agents,
                    allow_user_chaining,
                )?;
                println!("{}", project.id);
            }
            ProjectAction::AddAgents { project, agents } => {
                let updated = workspace.registry.add_project_agents(&project, &agents)?;
                println!("{} agent(s) registered with {}", updated.agents.len(), updated.name);
            }
            ProjectAction::SetChain {
                project,
                agents,
                json,
            } => {
                let chain = match json {
                    Some(raw) => parse_steps(&raw)?,
                    None => ExecutionChain::from_agent_ids(agents),
                };
                let updated = workspace.registry.set_chain(&project, chain)?;
                println!("Chain set: {} step(s)", updated.chain_config.len());
            }
            ProjectAction::Show { project } => {
                let project = workspace
                    .registry
                    .project(&project)?
                    .with_context(|| format!("Project not found: {}", project))?;
                println!("{}", serde_json::to_string_pretty(&project)?);
            }
            ProjectAction::List => {
                for p in workspace.registry.projects()? {
                    println!(
                        "{}  {}  agents={}  chain={}",
                        p.id,
                        p.name,
                        p.agents.len(),
                        p.chain_config.len()
                    );
                }
            }
        },
        Commands::Catalog => {}
    }
    Ok(())
}
