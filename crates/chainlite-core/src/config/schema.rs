//! Configuration structs grouped by concern.
//!
//! Loaded from the environment with the shared alias/fallback rules.

use super::env_keys::{llm, observability as obv_keys, orchestrator, paths, retrieval};
use super::loader::{env_bool, env_optional, env_or, env_usize};
use std::path::PathBuf;
use std::str::FromStr;

/// LLM API configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl LlmConfig {
    /// Load from env (reads `.env` first). Blank values get defaults.
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let api_base = env_or(llm::API_BASE, llm::API_BASE_ALIASES, || {
            "https://api.openai.com/v1".to_string()
        });
        let model = env_or(llm::MODEL, llm::MODEL_ALIASES, || {
            Self::default_model_for_base(&api_base).to_string()
        });
        Self {
            api_key: env_or(llm::API_KEY, llm::API_KEY_ALIASES, String::new),
            model,
            max_tokens: env_optional(llm::MAX_TOKENS, &[]).and_then(|v| v.parse().ok()),
            temperature: env_optional(llm::TEMPERATURE, &[]).and_then(|v| v.parse().ok()),
            api_base,
        }
    }

    /// `None` when the key or base URL is blank.
    pub fn try_from_env() -> Option<Self> {
        let cfg = Self::from_env();
        if cfg.api_key.trim().is_empty() || cfg.api_base.trim().is_empty() {
            None
        } else {
            Some(cfg)
        }
    }

    /// Default model inferred from the API base when none is set.
    pub fn default_model_for_base(api_base: &str) -> &'static str {
        if api_base.contains("localhost:11434") || api_base.contains("127.0.0.1:11434") {
            "qwen2.5:7b"
        } else if api_base.contains("api.groq.com") {
            "llama-3.3-70b-versatile"
        } else if api_base.contains("api.anthropic.com") {
            "claude-sonnet-4-20250514"
        } else if api_base.contains("api.deepseek.com") {
            "deepseek-chat"
        } else {
            "gpt-4o"
        }
    }
}

/// Data directory layout.
///
/// ```text
/// {data_dir}/registry.json
/// {data_dir}/documents/{project}/{file}
/// {data_dir}/index.sqlite
/// {data_dir}/sessions/{project}/{requester-hash}.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let data_dir = env_optional(paths::DATA_DIR, paths::DATA_DIR_ALIASES)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".chainlite")
            });
        Self { data_dir }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn index_file(&self) -> PathBuf {
        self.data_dir.join("index.sqlite")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}

/// Retrieval and chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let d = Self::default();
        let chunk_size = env_usize(retrieval::CHUNK_SIZE, &[], d.chunk_size).max(1);
        // Overlap must stay below the chunk size or chunking never advances.
        let chunk_overlap =
            env_usize(retrieval::CHUNK_OVERLAP, &[], d.chunk_overlap).min(chunk_size - 1);
        Self {
            top_k: env_usize(retrieval::TOP_K, retrieval::TOP_K_ALIASES, d.top_k).max(1),
            chunk_size,
            chunk_overlap,
        }
    }
}

/// What to do when a non-admin requests a chain that is not a subset of the
/// project default chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnauthorizedChainPolicy {
    /// Run the full project default chain instead.
    #[default]
    FallbackToDefault,
    /// Drop the unauthorized steps and keep the rest in requested order.
    FilterToAuthorized,
    /// Fail the request with `Forbidden`.
    Reject,
}

impl FromStr for UnauthorizedChainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fallback_to_default" | "default" => Ok(Self::FallbackToDefault),
            "filter_to_authorized" | "filter" => Ok(Self::FilterToAuthorized),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown chain policy: {}", other)),
        }
    }
}

/// What happens to the rest of a chain after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepFailurePolicy {
    /// Diagnostic becomes the next step's input.
    #[default]
    Continue,
    /// Stop the chain; the diagnostic is the answer.
    Abort,
}

impl FromStr for StepFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown step failure policy: {}", other)),
        }
    }
}

/// Chain resolution and execution settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub chain_policy: UnauthorizedChainPolicy,
    pub step_failure: StepFailurePolicy,
    pub max_iterations: usize,
    pub legacy_agent_chain: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chain_policy: UnauthorizedChainPolicy::default(),
            step_failure: StepFailurePolicy::default(),
            max_iterations: 12,
            legacy_agent_chain: false,
        }
    }
}

impl OrchestratorConfig {
    /// Unparseable policy values are logged and replaced by the default.
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let d = Self::default();
        let chain_policy = match env_optional(orchestrator::CHAIN_POLICY, &[]) {
            Some(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}; using fallback_to_default", e);
                d.chain_policy
            }),
            None => d.chain_policy,
        };
        let step_failure = match env_optional(orchestrator::STEP_FAILURE, &[]) {
            Some(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}; using continue", e);
                d.step_failure
            }),
            None => d.step_failure,
        };
        Self {
            chain_policy,
            step_failure,
            max_iterations: env_usize(orchestrator::MAX_ITERATIONS, &[], d.max_iterations).max(1),
            legacy_agent_chain: env_bool(orchestrator::LEGACY_AGENT_CHAIN, &[], false),
        }
    }
}

/// Logging configuration: quiet, level, JSON output, audit log path.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::QUIET, &[], false),
                log_level: env_or(obv_keys::LOG_LEVEL, &[], || "chainlite=info".to_string()),
                log_json: env_bool(obv_keys::LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::AUDIT_LOG, &[]),
            }
        })
    }
}
