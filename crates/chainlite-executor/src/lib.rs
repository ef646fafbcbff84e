//! chainlite-executor: storage collaborators of the orchestration core.
//!
//! - `registry`: agent descriptors and projects (JSON file)
//! - `documents`: project-scoped document store, text extraction
//! - `index`: SQLite FTS5 snippet index
//! - `session`: append-only chat session recorder

pub mod documents;
pub mod index;
pub mod registry;
pub mod session;

pub use documents::{DocumentStore, FsDocumentStore};
pub use index::SnippetIndex;
pub use registry::{JsonRegistry, NewAgent, Registry};
pub use session::{JsonlSessionRecorder, SessionRecorder};
