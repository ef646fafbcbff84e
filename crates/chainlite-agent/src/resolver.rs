//! Chain resolution: which steps run for a request, under which authorization
//! policy.
//!
//! Decision order:
//! 1. explicit chain + admin requester → explicit chain as-is
//! 2. explicit chain + non-admin → explicit chain if its agent ids are a subset
//!    of the default chain's, otherwise [`UnauthorizedChainPolicy`] decides
//! 3. no explicit chain → project default chain
//! 4. empty default → [`Resolution::NoChainConfigured`] (fallback loop runs)

use chainlite_core::config::{OrchestratorConfig, UnauthorizedChainPolicy};
use chainlite_core::model::{ExecutionChain, Project};
use chainlite_core::protocol::ChatRequest;
use chainlite_core::ChainError;
use chainlite_executor::Registry;
use std::sync::Arc;

/// Where a resolved chain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainProvenance {
    Requested,
    ProjectDefault,
    /// Requested chain narrowed to the authorized steps.
    Filtered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Chain {
        chain: ExecutionChain,
        provenance: ChainProvenance,
    },
    NoChainConfigured,
}

impl Resolution {
    pub fn chain(&self) -> Option<&ExecutionChain> {
        match self {
            Resolution::Chain { chain, .. } => Some(chain),
            Resolution::NoChainConfigured => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub project: Project,
    pub resolution: Resolution,
}

pub struct ChainResolver {
    registry: Arc<dyn Registry>,
    config: OrchestratorConfig,
}

impl ChainResolver {
    pub fn new(registry: Arc<dyn Registry>, config: OrchestratorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Look up the project and pick the chain. Unknown project is `NotFound`;
    /// a `Reject` policy violation is `Forbidden`.
    pub fn resolve(&self, request: &ChatRequest) -> Result<ResolvedRequest, ChainError> {
        let project = self
            .registry
            .project(&request.project)
            .map_err(ChainError::storage)?
            .ok_or_else(|| ChainError::project_not_found(&request.project))?;
        let resolution = self.resolve_for(&project, request)?;
        Ok(ResolvedRequest {
            project,
            resolution,
        })
    }

    /// The project's stored chain, or one step per registered agent when the
    /// legacy derivation is enabled and nothing is stored.
    pub fn default_chain(&self, project: &Project) -> ExecutionChain {
        if project.chain_config.is_empty() && self.config.legacy_agent_chain {
            return ExecutionChain::from_agent_ids(project.agents.iter().cloned());
        }
        project.chain_config.clone()
    }

    pub fn resolve_for(
        &self,
        project: &Project,
        request: &ChatRequest,
    ) -> Result<Resolution, ChainError> {
        let default = self.default_chain(project);
        let requested = request.explicit_chain.as_ref().filter(|c| !c.is_empty());

        let (chain, provenance) = match requested {
            Some(chain) if request.role.is_admin() => (chain.clone(), ChainProvenance::Requested),
            Some(chain) if chain.is_subset_of(&default) => {
                (chain.clone(), ChainProvenance::Requested)
            }
            Some(chain) => self.unauthorized(project, chain, default)?,
            None => (default, ChainProvenance::ProjectDefault),
        };

        if chain.is_empty() {
            tracing::debug!(project = %project.id, "no chain configured");
            return Ok(Resolution::NoChainConfigured);
        }
        tracing::debug!(
            project = %project.id,
            steps = chain.len(),
            provenance = ?provenance,
            "chain resolved"
        );
        Ok(Resolution::Chain { chain, provenance })
    }

    fn unauthorized(
        &self,
        project: &Project,
        requested: &ExecutionChain,
        default: ExecutionChain,
    ) -> Result<(ExecutionChain, ChainProvenance), ChainError> {
        match self.config.chain_policy {
            UnauthorizedChainPolicy::FallbackToDefault => {
                tracing::info!(
                    project = %project.id,
                    "requested chain not authorized; using project default"
                );
                Ok((default, ChainProvenance::ProjectDefault))
            }
            UnauthorizedChainPolicy::FilterToAuthorized => {
                let filtered = requested.retain_authorized(&default);
                if filtered.is_empty() {
                    Ok((default, ChainProvenance::ProjectDefault))
                } else {
                    tracing::info!(
                        project = %project.id,
                        kept = filtered.len(),
                        dropped = requested.len() - filtered.len(),
                        "requested chain filtered to authorized steps"
                    );
                    Ok((filtered, ChainProvenance::Filtered))
                }
            }
            UnauthorizedChainPolicy::Reject => {
                let outside: Vec<&str> = requested
                    .agent_ids()
                    .difference(&default.agent_ids())
                    .copied()
                    .collect();
                Err(ChainError::Forbidden(format!(
                    "requested chain uses agents outside the project default chain: {}",
                    outside.join(", ")
                )))
            }
        }
    }
}
