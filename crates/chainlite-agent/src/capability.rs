//! The contract every pluggable unit implements, and the snippet side channel
//! retrieval-backed units report through.

use async_trait::async_trait;
use chainlite_core::model::Snippet;
use chainlite_core::ChainError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A runnable agent: text in, text out.
///
/// Composition is the executor's job; an agent never waits on another agent.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: &str) -> Result<String, ChainError>;
}

/// Collects retrieved snippets across steps or tool calls. Duplicates (same
/// source and chunk) are dropped; an optional cap bounds the total.
#[derive(Clone, Default)]
pub struct SourceCollector {
    inner: Arc<Mutex<CollectorState>>,
    cap: Option<usize>,
}

#[derive(Default)]
struct CollectorState {
    seen: HashSet<(String, usize)>,
    snippets: Vec<Snippet>,
}

impl SourceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            inner: Arc::default(),
            cap: Some(cap),
        }
    }

    pub fn extend(&self, snippets: impl IntoIterator<Item = Snippet>) {
        let Ok(mut state) = self.inner.lock() else {
            tracing::warn!("source collector lock poisoned; dropping snippets");
            return;
        };
        for s in snippets {
            if self.cap.is_some_and(|cap| state.snippets.len() >= cap) {
                break;
            }
            let key = (s.source.clone(), s.chunk_index);
            if state.seen.insert(key) {
                state.snippets.push(s);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.snippets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything collected so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Snippet> {
        self.inner
            .lock()
            .map(|s| s.snippets.clone())
            .unwrap_or_default()
    }
}
