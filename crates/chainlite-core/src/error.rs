//! Error taxonomy shared by every chainlite crate.
//!
//! Step-level variants are caught at the chain step boundary and folded into the
//! answer text; the rest abort the request.

use thiserror::Error;

/// Errors raised while resolving, loading or running agents.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Missing credential, code location or other construction-time input.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An agent's `run` failed. Displayed as the bare reason.
    #[error("{0}")]
    Execution(String),

    /// No implementation found in a loaded unit.
    #[error("Could not find an Agent implementation in {unit}")]
    AgentResolution { unit: String },

    /// More than one candidate implementation and none matches the expected name.
    #[error(
        "Ambiguous Agent implementation in {unit} (expected {expected}, candidates: {})",
        .candidates.join(", ")
    )]
    ResolutionAmbiguity {
        unit: String,
        expected: String,
        candidates: Vec<String>,
    },

    /// Unknown project or agent identifier.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ChainError {
    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Project",
            id: id.into(),
        }
    }

    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Agent",
            id: id.into(),
        }
    }

    /// Wrap a collaborator failure, keeping the full `anyhow` context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", err))
    }

    /// Errors an agent is expected to raise and the executor recovers from.
    pub fn is_step_level(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Execution(_)
                | Self::AgentResolution { .. }
                | Self::ResolutionAmbiguity { .. }
                | Self::Llm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
