//! Unified configuration layer.
//!
//! Every environment read goes through this module; business code uses the
//! structured configs instead of `std::env::var`.
//!
//! - `loader`: env_or, env_optional, env_bool helpers
//! - `schema`: LlmConfig, PathsConfig, RetrievalConfig, OrchestratorConfig, ObservabilityConfig
//! - `env_keys`: key constants with aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    env_bool, env_optional, env_or, env_usize, init_llm_env, load_dotenv, remove_env_var,
    set_env_var,
};
pub use schema::{
    LlmConfig, ObservabilityConfig, OrchestratorConfig, PathsConfig, RetrievalConfig,
    StepFailurePolicy, UnauthorizedChainPolicy,
};
