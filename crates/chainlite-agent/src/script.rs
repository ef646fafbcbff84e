//! Script agents: an executable file on disk run as a child process.
//!
//! Input is written to stdin, stdout (trailing whitespace trimmed) is the
//! output. The descriptor's config is exported as JSON in
//! `CHAINLITE_AGENT_CONFIG` and the display name in `CHAINLITE_AGENT_NAME`.

use async_trait::async_trait;
use chainlite_core::config::env_keys::script as script_keys;
use chainlite_core::ChainError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::capability::Agent;

/// A resolved script file plus the interpreter its extension maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUnit {
    pub path: PathBuf,
    /// `None` runs the file directly.
    pub interpreter: Option<&'static str>,
}

impl ScriptUnit {
    pub fn new(path: &Path) -> Self {
        let interpreter = match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Some("python3"),
            Some("sh") => Some("sh"),
            Some("js") | Some("mjs") => Some("node"),
            _ => None,
        };
        Self {
            path: path.to_path_buf(),
            interpreter,
        }
    }

    fn command(&self) -> Command {
        match self.interpreter {
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        }
    }
}

pub struct ScriptAgent {
    name: String,
    unit: Arc<ScriptUnit>,
    config_json: String,
}

impl ScriptAgent {
    pub fn new(
        name: &str,
        unit: Arc<ScriptUnit>,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            unit,
            config_json: serde_json::Value::Object(config.clone()).to_string(),
        }
    }
}

#[async_trait]
impl Agent for ScriptAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        let mut child = self
            .unit
            .command()
            .env(script_keys::AGENT_CONFIG, &self.config_json)
            .env(script_keys::AGENT_NAME, &self.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ChainError::Execution(format!(
                    "Failed to start {}: {}",
                    self.unit.path.display(),
                    e
                ))
            })?;

        // Feed stdin concurrently so a chatty script cannot block on a full pipe.
        let stdin = child.stdin.take();
        let payload = input.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // A script that ignores stdin closes the pipe early; not an error.
                let _ = stdin.write_all(&payload).await;
                let _ = stdin.shutdown().await;
            }
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ChainError::Execution(format!("Error waiting for script: {}", e)))?;
        let _ = writer.await;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            tracing::debug!(agent = %self.name, code = %code, "script failed");
            return Err(ChainError::Execution(format!(
                "script exited with {}: {}",
                code,
                stderr.trim()
            )));
        }
        Ok(stdout.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_interpreter_by_extension() {
        assert_eq!(ScriptUnit::new(Path::new("a.py")).interpreter, Some("python3"));
        assert_eq!(ScriptUnit::new(Path::new("a.sh")).interpreter, Some("sh"));
        assert_eq!(ScriptUnit::new(Path::new("a.js")).interpreter, Some("node"));
        assert_eq!(ScriptUnit::new(Path::new("bin/tool")).interpreter, None);
    }

    #[tokio::test]
    async fn test_script_reads_stdin_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "shout.sh",
            "read line\necho \"$CHAINLITE_AGENT_NAME: $line\" | tr a-z A-Z\necho \"$CHAINLITE_AGENT_CONFIG\"\n",
        );
        let mut config = serde_json::Map::new();
        config.insert("mode".into(), serde_json::json!("loud"));
        let agent = ScriptAgent::new("shout", Arc::new(ScriptUnit::new(&path)), &config);

        let out = agent.run("hello\n").await.unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("SHOUT: HELLO"));
        assert_eq!(lines.next(), Some(r#"{"mode":"loud"}"#));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "fail.sh", "echo 'quota exceeded' >&2\nexit 3\n");
        let agent = ScriptAgent::new("fail", Arc::new(ScriptUnit::new(&path)), &Default::default());

        let err = agent.run("x").await.unwrap_err();
        assert!(matches!(err, ChainError::Execution(_)));
        assert_eq!(err.to_string(), "script exited with 3: quota exceeded");
    }
}
