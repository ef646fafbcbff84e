//! Environment variable keys and aliases.
//!
//! Primary keys are `CHAINLITE_*`; `OPENAI_*` and provider keys are accepted as aliases.

/// LLM API
pub mod llm {
    pub const API_BASE: &str = "CHAINLITE_API_BASE";
    pub const API_BASE_ALIASES: &[&str] = &["OPENAI_API_BASE", "OPENAI_BASE_URL", "BASE_URL"];

    pub const API_KEY: &str = "CHAINLITE_API_KEY";
    pub const API_KEY_ALIASES: &[&str] = &["OPENAI_API_KEY", "GROQ_API_KEY", "API_KEY"];

    pub const MODEL: &str = "CHAINLITE_MODEL";
    pub const MODEL_ALIASES: &[&str] = &["OPENAI_MODEL", "MODEL"];

    pub const MAX_TOKENS: &str = "CHAINLITE_MAX_TOKENS";
    pub const TEMPERATURE: &str = "CHAINLITE_TEMPERATURE";
}

/// Data directories
pub mod paths {
    pub const DATA_DIR: &str = "CHAINLITE_DATA_DIR";
    pub const DATA_DIR_ALIASES: &[&str] = &["CHAINLITE_DATA_ROOT"];
}

/// Retrieval index and chunking
pub mod retrieval {
    pub const TOP_K: &str = "CHAINLITE_TOP_K";
    pub const TOP_K_ALIASES: &[&str] = &["CHAINLITE_RAG_TOP_K"];
    pub const CHUNK_SIZE: &str = "CHAINLITE_CHUNK_SIZE";
    pub const CHUNK_OVERLAP: &str = "CHAINLITE_CHUNK_OVERLAP";
}

/// Chain resolution and execution policy
pub mod orchestrator {
    /// `fallback_to_default` (default) | `filter_to_authorized` | `reject`
    pub const CHAIN_POLICY: &str = "CHAINLITE_CHAIN_POLICY";
    /// `continue` (default) | `abort`
    pub const STEP_FAILURE: &str = "CHAINLITE_STEP_FAILURE";
    /// Max LLM round-trips in the tool-calling fallback loop.
    pub const MAX_ITERATIONS: &str = "CHAINLITE_MAX_ITERATIONS";
    /// Derive the default chain from the project's agent list when no chain is stored.
    pub const LEGACY_AGENT_CHAIN: &str = "CHAINLITE_LEGACY_AGENT_CHAIN";
}

/// Logging
pub mod observability {
    pub const QUIET: &str = "CHAINLITE_QUIET";
    pub const LOG_LEVEL: &str = "CHAINLITE_LOG_LEVEL";
    pub const LOG_JSON: &str = "CHAINLITE_LOG_JSON";
    pub const AUDIT_LOG: &str = "CHAINLITE_AUDIT_LOG";
}

/// Script agents
pub mod script {
    /// Descriptor configuration handed to script agents as JSON.
    pub const AGENT_CONFIG: &str = "CHAINLITE_AGENT_CONFIG";
    /// Descriptor display name handed to script agents.
    pub const AGENT_NAME: &str = "CHAINLITE_AGENT_NAME";
}
