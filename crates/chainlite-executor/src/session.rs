//! Chat session recorder: append-only JSONL per (project, requester).
//!
//! Entry types: session (header), turn, chain. History is rebuilt by replaying
//! the file; the last `chain` entry is the chain used by the latest turn.

use anyhow::{bail, Context, Result};
use chainlite_core::model::{ChatSession, ChatTurn, ExecutionChain};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persists chat turns and the chain that produced them.
pub trait SessionRecorder: Send + Sync {
    /// `chain_used` is `None` when the fallback agent answered.
    fn append(
        &self,
        project: &str,
        requester: &str,
        user_turn: &ChatTurn,
        assistant_turn: &ChatTurn,
        chain_used: Option<&ExecutionChain>,
    ) -> Result<()>;

    /// Empty session when nothing was recorded yet.
    fn fetch_history(&self, project: &str, requester: &str) -> Result<ChatSession>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionEntry {
    Session {
        project_id: String,
        requester: String,
        timestamp: String,
    },
    Turn(ChatTurn),
    Chain {
        #[serde(default)]
        chain: Option<ExecutionChain>,
    },
}

pub struct JsonlSessionRecorder {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSessionRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `{root}/{project}/{sha256(requester)[..16]}.jsonl`
    pub fn session_path(&self, project: &str, requester: &str) -> Result<PathBuf> {
        if project.is_empty() || project.contains(['/', '\\']) || project.starts_with('.') {
            bail!("Invalid project id: {:?}", project);
        }
        Ok(self
            .root
            .join(project)
            .join(format!("{}.jsonl", requester_key(requester))))
    }
}

/// Hash of the identity exactly as given; `Ana@x` and `ana@x` are distinct.
fn requester_key(requester: &str) -> String {
    let digest = Sha256::digest(requester.as_bytes());
    hex::encode(&digest[..8])
}

fn append_entries(path: &Path, entries: &[SessionEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open session: {}", path.display()))?;
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())?;
    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<SessionEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open session: {}", path.display()))?;
    let mut entries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            // A torn final write should not make the whole history unreadable.
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                "skipping unreadable session entry: {}",
                e
            ),
        }
    }
    Ok(entries)
}

impl SessionRecorder for JsonlSessionRecorder {
    fn append(
        &self,
        project: &str,
        requester: &str,
        user_turn: &ChatTurn,
        assistant_turn: &ChatTurn,
        chain_used: Option<&ExecutionChain>,
    ) -> Result<()> {
        let path = self.session_path(project, requester)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        let mut entries = Vec::with_capacity(4);
        if !path.exists() {
            entries.push(SessionEntry::Session {
                project_id: project.to_string(),
                requester: requester.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            });
        }
        entries.push(SessionEntry::Turn(user_turn.clone()));
        entries.push(SessionEntry::Turn(assistant_turn.clone()));
        entries.push(SessionEntry::Chain {
            chain: chain_used.cloned(),
        });
        append_entries(&path, &entries)
    }

    fn fetch_history(&self, project: &str, requester: &str) -> Result<ChatSession> {
        let path = self.session_path(project, requester)?;
        let mut session = ChatSession {
            project_id: project.to_string(),
            requester: requester.to_string(),
            ..Default::default()
        };
        for entry in read_entries(&path)? {
            match entry {
                SessionEntry::Session { .. } => {}
                SessionEntry::Turn(turn) => session.turns.push(turn),
                SessionEntry::Chain { chain } => session.last_chain = chain,
            }
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlite_core::model::{Snippet, TurnRole};

    #[test]
    fn test_append_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let rec = JsonlSessionRecorder::new(dir.path());
        let chain = ExecutionChain::from_agent_ids(["a1", "a2"]);
        let sources = vec![Snippet {
            content: "invoice total is 42".into(),
            source: "invoice.txt".into(),
            chunk_index: 0,
            score: 1.0,
        }];
        rec.append(
            "p1",
            "u@example.com",
            &ChatTurn::user("q1"),
            &ChatTurn::assistant("a1", sources.clone()),
            Some(&chain),
        )
        .unwrap();
        rec.append(
            "p1",
            "u@example.com",
            &ChatTurn::user("q2"),
            &ChatTurn::assistant("a2", vec![]),
            None,
        )
        .unwrap();

        let s = rec.fetch_history("p1", "u@example.com").unwrap();
        assert_eq!(s.turns.len(), 4);
        assert_eq!(s.turns[0].role, TurnRole::User);
        assert_eq!(s.turns[1].sources, sources);
        assert_eq!(s.turns[3].content, "a2");
        assert_eq!(s.last_chain, None);

        let header_count = std::fs::read_to_string(rec.session_path("p1", "u@example.com").unwrap())
            .unwrap()
            .lines()
            .filter(|l| l.contains("\"type\":\"session\""))
            .count();
        assert_eq!(header_count, 1);
    }

    #[test]
    fn test_sessions_are_keyed_by_requester_and_project() {
        let dir = tempfile::tempdir().unwrap();
        let rec = JsonlSessionRecorder::new(dir.path());
        rec.append(
            "p1",
            "a@example.com",
            &ChatTurn::user("q"),
            &ChatTurn::assistant("a", vec![]),
            Some(&ExecutionChain::from_agent_ids(["x"])),
        )
        .unwrap();
        assert!(rec.fetch_history("p1", "b@example.com").unwrap().turns.is_empty());
        assert!(rec.fetch_history("p2", "a@example.com").unwrap().turns.is_empty());
        assert!(rec.fetch_history("p1", "A@example.com").unwrap().turns.is_empty());
        let s = rec.fetch_history("p1", "a@example.com").unwrap();
        assert_eq!(s.turns.len(), 2);
        assert_eq!(s.last_chain, Some(ExecutionChain::from_agent_ids(["x"])));
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let rec = JsonlSessionRecorder::new(dir.path());
        rec.append("p", "u", &ChatTurn::user("q"), &ChatTurn::assistant("a", vec![]), None)
            .unwrap();
        let path = rec.session_path("p", "u").unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"type\":\"turn\",\"ro").unwrap();
        assert_eq!(rec.fetch_history("p", "u").unwrap().turns.len(), 2);
    }

    #[test]
    fn test_rejects_bad_project_id() {
        let rec = JsonlSessionRecorder::new("/tmp/unused");
        assert!(rec.session_path("../x", "u").is_err());
        assert!(rec.session_path("", "u").is_err());
    }
}
