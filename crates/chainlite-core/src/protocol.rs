//! Chat request/response types exchanged with the orchestration core.

use crate::model::{ExecutionChain, Project, Snippet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequesterRole {
    Admin,
    #[default]
    User,
}

impl RequesterRole {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// One chat query against a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub project: String,
    pub query: String,
    /// Requester identity (email or user id). Keys the chat session.
    pub requester: String,
    #[serde(default)]
    pub role: RequesterRole,
    /// Requested chain for this call only. Empty is treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_chain: Option<ExecutionChain>,
    /// Projects a non-admin requester may access.
    #[serde(default)]
    pub authorized_projects: Vec<String>,
}

impl ChatRequest {
    pub fn new(
        project: impl Into<String>,
        query: impl Into<String>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            query: query.into(),
            requester: requester.into(),
            role: RequesterRole::User,
            explicit_chain: None,
            authorized_projects: Vec::new(),
        }
    }

    pub fn as_admin(mut self) -> Self {
        self.role = RequesterRole::Admin;
        self
    }

    pub fn with_chain(mut self, chain: ExecutionChain) -> Self {
        self.explicit_chain = Some(chain);
        self
    }

    pub fn authorized_for<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_projects = projects.into_iter().map(Into::into).collect();
        self
    }

    /// Admins see every project; others only those listed.
    pub fn may_access_project(&self) -> bool {
        self.role.is_admin() || self.authorized_projects.iter().any(|p| p == &self.project)
    }
}

/// Which path produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Chain,
    Fallback,
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chain => write!(f, "chain"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Snippet>,
    pub mode: ChatMode,
}

/// A document upload into a project's corpus on behalf of a requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub project: String,
    pub requester: String,
    #[serde(default)]
    pub role: RequesterRole,
    #[serde(default)]
    pub authorized_projects: Vec<String>,
    /// File to copy into the document store.
    pub file: PathBuf,
    /// Name the document is stored and cited under.
    pub original_name: String,
}

impl IngestRequest {
    pub fn new(
        project: impl Into<String>,
        requester: impl Into<String>,
        file: impl Into<PathBuf>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            requester: requester.into(),
            role: RequesterRole::User,
            authorized_projects: Vec::new(),
            file: file.into(),
            original_name: original_name.into(),
        }
    }

    pub fn as_admin(mut self) -> Self {
        self.role = RequesterRole::Admin;
        self
    }

    pub fn authorized_for<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_projects = projects.into_iter().map(Into::into).collect();
        self
    }

    /// Admins may upload anywhere. Others need the project among their
    /// authorized projects and the project open to user chaining.
    pub fn may_upload_to(&self, project: &Project) -> bool {
        self.role.is_admin()
            || (project.allow_user_chaining
                && self.authorized_projects.iter().any(|p| p == &project.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_access() {
        let req = ChatRequest::new("p1", "q", "u@example.com");
        assert!(!req.may_access_project());
        assert!(req.clone().authorized_for(["p1"]).may_access_project());
        assert!(req.as_admin().may_access_project());
    }

    #[test]
    fn test_upload_needs_admin_or_open_project() {
        let mut project = Project {
            id: "p1".into(),
            name: "P".into(),
            description: None,
            agents: vec![],
            chain_config: ExecutionChain::default(),
            allow_user_chaining: false,
            created_at: chrono::Utc::now(),
        };
        let member = IngestRequest::new("p1", "u", "f.txt", "f.txt").authorized_for(["p1"]);
        let stranger = IngestRequest::new("p1", "u", "f.txt", "f.txt").authorized_for(["p2"]);
        assert!(!member.may_upload_to(&project));
        assert!(member.clone().as_admin().may_upload_to(&project));

        project.allow_user_chaining = true;
        assert!(member.may_upload_to(&project));
        assert!(!stranger.may_upload_to(&project));
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let resp = ChatResponse {
            answer: "a".into(),
            sources: vec![],
            mode: ChatMode::Fallback,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["mode"], "fallback");
    }
}
