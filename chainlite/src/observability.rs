//! Observability: tracing init and the chat audit log.
//!
//! Uses config::ObservabilityConfig for CHAINLITE_QUIET, LOG_LEVEL, LOG_JSON, AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chainlite_agent::{ChatOutcome, StepOutcome};
use chainlite_core::config::ObservabilityConfig;
use chrono::Utc;
use serde_json::{json, Value};
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call once at process startup.
/// CHAINLITE_QUIET=1 keeps only WARN and above; RUST_LOG overrides everything.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "chainlite=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Logs go to stderr; stdout carries answers.
    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = ObservabilityConfig::from_env().audit_log.clone()?;
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn chat_record(project: &str, requester: &str, outcome: &ChatOutcome, duration_ms: u64) -> Value {
    let executed: Vec<&str> = outcome
        .steps
        .iter()
        .filter(|s| !matches!(s.outcome, StepOutcome::Skipped))
        .map(|s| s.agent_id.as_str())
        .collect();
    let failed: Vec<Value> = outcome
        .steps
        .iter()
        .filter_map(|s| match &s.outcome {
            StepOutcome::Failed(diagnostic) => Some(json!({
                "step": s.index,
                "agent_id": s.agent_id,
                "diagnostic": diagnostic,
            })),
            _ => None,
        })
        .collect();
    json!({
        "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "event": "chat_completed",
        "project": project,
        "requester": requester,
        "mode": outcome.response.mode,
        "agents_executed": executed,
        "failed_steps": failed,
        "tool_calls": outcome.tool_calls,
        "sources": outcome.response.sources.len(),
        "duration_ms": duration_ms,
    })
}

/// Audit: chat_completed, one line per answered request.
pub fn audit_chat(project: &str, requester: &str, outcome: &ChatOutcome, duration_ms: u64) {
    if let Some(path) = get_audit_path() {
        append_jsonl(&path, &chat_record(project, requester, outcome, duration_ms));
    }
}

/// Audit: document_ingested
pub fn audit_ingest(project: &str, name: &str, chunks: usize) {
    if let Some(path) = get_audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "document_ingested",
            "project": project,
            "document": name,
            "chunks": chunks,
        });
        append_jsonl(&path, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlite_agent::StepReport;
    use chainlite_core::protocol::{ChatMode, ChatResponse};

    #[test]
    fn test_chat_record_lists_executed_and_failed_steps() {
        let step = |index, id: &str, outcome| StepReport {
            index,
            agent_id: id.to_string(),
            agent_name: None,
            outcome,
        };
        let outcome = ChatOutcome {
            response: ChatResponse {
                answer: "ok".into(),
                sources: Vec::new(),
                mode: ChatMode::Chain,
            },
            chain_used: None,
            steps: vec![
                step(0, "a", StepOutcome::Failed("Error executing agent A: boom".into())),
                step(1, "ghost", StepOutcome::Skipped),
                step(2, "b", StepOutcome::Completed("ok".into())),
            ],
            tool_calls: 0,
        };
        let record = chat_record("p", "u", &outcome, 12);
        assert_eq!(record["event"], "chat_completed");
        assert_eq!(record["mode"], "chain");
        assert_eq!(record["agents_executed"], json!(["a", "b"]));
        assert_eq!(record["failed_steps"][0]["agent_id"], "a");
        assert_eq!(record["failed_steps"].as_array().map(Vec::len), Some(1));
    }
}
