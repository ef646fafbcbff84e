//! Agent and project registry: a single `registry.json` document.
//!
//! Reads go through the [`Registry`] trait; mutations are inherent methods on
//! [`JsonRegistry`] and rewrite the whole file (temp file + rename).

use anyhow::{bail, Context, Result};
use chainlite_core::model::{AgentDescriptor, ExecutionChain, Project};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Read side used by the orchestration core.
pub trait Registry: Send + Sync {
    fn project(&self, id: &str) -> Result<Option<Project>>;
    fn agent(&self, id: &str) -> Result<Option<AgentDescriptor>>;
    fn agents(&self) -> Result<Vec<AgentDescriptor>>;
    fn projects(&self) -> Result<Vec<Project>>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RegistryData {
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
    #[serde(default)]
    projects: Vec<Project>,
}

/// New agent registration.
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub agent_type: String,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub code_location: Option<String>,
}

/// JSON-file registry. `path: None` keeps everything in memory.
pub struct JsonRegistry {
    path: Option<PathBuf>,
    data: RwLock<RegistryData>,
}

impl JsonRegistry {
    /// Open (or lazily create) the registry file.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry: {}", path.display()))?;
            if raw.trim().is_empty() {
                RegistryData::default()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid registry JSON: {}", path.display()))?
            }
        } else {
            RegistryData::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(RegistryData::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RegistryData>> {
        self.data
            .read()
            .map_err(|_| anyhow::anyhow!("registry lock poisoned"))
    }

    /// Apply `f` to a copy of the data, persist it, then publish it.
    fn update<T>(&self, f: impl FnOnce(&mut RegistryData) -> Result<T>) -> Result<T> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("registry lock poisoned"))?;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(ref path) = self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }

    pub fn register_agent(&self, agent: NewAgent) -> Result<AgentDescriptor> {
        if agent.name.trim().is_empty() {
            bail!("Agent name must not be empty");
        }
        let descriptor = AgentDescriptor {
            id: new_id(),
            name: agent.name.trim().to_string(),
            description: agent.description,
            agent_type: if agent.agent_type.trim().is_empty() {
                "general".to_string()
            } else {
                agent.agent_type.trim().to_string()
            },
            config: agent.config,
            code_location: agent.code_location,
            created_at: chrono::Utc::now(),
        };
        self.update(|d| {
            d.agents.push(descriptor.clone());
            Ok(())
        })?;
        tracing::info!(agent = %descriptor.id, name = %descriptor.name, "agent registered");
        Ok(descriptor)
    }

    /// Replace an agent's configuration map. The only mutable descriptor field.
    pub fn set_agent_config(
        &self,
        agent_id: &str,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<AgentDescriptor> {
        self.update(|d| {
            let agent = d
                .agents
                .iter_mut()
                .find(|a| a.id == agent_id)
                .with_context(|| format!("Agent not found: {}", agent_id))?;
            agent.config = config;
            Ok(agent.clone())
        })
    }

    /// Create a project. Listed agents must exist.
    pub fn create_project(
        &self,
        name: &str,
        description: Option<String>,
        agents: Vec<String>,
        allow_user_chaining: bool,
    ) -> Result<Project> {
        if name.trim().is_empty() {
            bail!("Project name must not be empty");
        }
        let project = Project {
            id: new_id(),
            name: name.trim().to_string(),
            description,
            agents,
            chain_config: ExecutionChain::default(),
            allow_user_chaining,
            created_at: chrono::Utc::now(),
        };
        self.update(|d| {
            for id in &project.agents {
                if !d.agents.iter().any(|a| &a.id == id) {
                    bail!("Agent not found: {}", id);
                }
            }
            d.projects.push(project.clone());
            Ok(())
        })?;
        tracing::info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Store the project default chain. Step `name`/`type` are refreshed from
    /// the descriptors; unknown agent ids are kept and skipped at run time.
    pub fn set_chain(&self, project_id: &str, chain: ExecutionChain) -> Result<Project> {
        self.update(|d| {
            let mut chain = chain;
            for step in &mut chain.steps {
                if let Some(agent) = d.agents.iter().find(|a| a.id == step.agent_id) {
                    step.name = Some(agent.name.clone());
                    step.agent_type = Some(agent.agent_type.clone());
                }
            }
            let project = d
                .projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .with_context(|| format!("Project not found: {}", project_id))?;
            project.chain_config = chain;
            Ok(project.clone())
        })
    }

    /// Attach agents to a project's registered set (ignores duplicates).
    pub fn add_project_agents(&self, project_id: &str, agent_ids: &[String]) -> Result<Project> {
        self.update(|d| {
            for id in agent_ids {
                if !d.agents.iter().any(|a| &a.id == id) {
                    bail!("Agent not found: {}", id);
                }
            }
            let project = d
                .projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .with_context(|| format!("Project not found: {}", project_id))?;
            for id in agent_ids {
                if !project.agents.contains(id) {
                    project.agents.push(id.clone());
                }
            }
            Ok(project.clone())
        })
    }
}

impl Registry for JsonRegistry {
    fn project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.read()?.projects.iter().find(|p| p.id == id).cloned())
    }

    fn agent(&self, id: &str) -> Result<Option<AgentDescriptor>> {
        Ok(self.read()?.agents.iter().find(|a| a.id == id).cloned())
    }

    fn agents(&self) -> Result<Vec<AgentDescriptor>> {
        Ok(self.read()?.agents.clone())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.read()?.projects.clone())
    }
}

fn persist(path: &Path, data: &RegistryData) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write registry: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace registry: {}", path.display()))?;
    Ok(())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlite_core::model::ChainStep;

    fn echo() -> NewAgent {
        NewAgent {
            name: "Echo".into(),
            agent_type: "code".into(),
            code_location: Some("builtin:echo".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_register_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let reg = JsonRegistry::open(&path).unwrap();
        let agent = reg.register_agent(echo()).unwrap();
        let project = reg
            .create_project("Demo", None, vec![agent.id.clone()], false)
            .unwrap();
        reg.set_chain(
            &project.id,
            ExecutionChain::new(vec![ChainStep::new(agent.id.clone()).with_context("ctx")]),
        )
        .unwrap();

        let reopened = JsonRegistry::open(&path).unwrap();
        let p = reopened.project(&project.id).unwrap().unwrap();
        assert_eq!(p.chain_config.steps.len(), 1);
        assert_eq!(p.chain_config.steps[0].name.as_deref(), Some("Echo"));
        assert_eq!(p.chain_config.steps[0].context.as_deref(), Some("ctx"));
        assert_eq!(reopened.agents().unwrap().len(), 1);
    }

    #[test]
    fn test_create_project_rejects_unknown_agent() {
        let reg = JsonRegistry::in_memory();
        let err = reg
            .create_project("Demo", None, vec!["missing".into()], false)
            .unwrap_err();
        assert!(err.to_string().contains("Agent not found"));
        assert!(reg.projects().unwrap().is_empty());
    }

    #[test]
    fn test_set_chain_unknown_project() {
        let reg = JsonRegistry::in_memory();
        assert!(reg.set_chain("nope", ExecutionChain::default()).is_err());
    }

    #[test]
    fn test_set_agent_config_and_add_agents() {
        let reg = JsonRegistry::in_memory();
        let a = reg.register_agent(echo()).unwrap();
        let p = reg.create_project("Demo", None, vec![], true).unwrap();
        let mut cfg = serde_json::Map::new();
        cfg.insert("k".into(), serde_json::json!("v"));
        let updated = reg.set_agent_config(&a.id, cfg).unwrap();
        assert_eq!(updated.config_str("k"), Some("v"));
        let p = reg
            .add_project_agents(&p.id, &[a.id.clone(), a.id.clone()])
            .unwrap();
        assert_eq!(p.agents, vec![a.id]);
    }
}
